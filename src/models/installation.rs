use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationConfig {
    pub app_id: String,
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Installation {
    pub id: Uuid,
    pub device_id: String,
    pub config: InstallationConfig,
    pub enabled: bool,
    pub skipped_by_user: bool,
    pub skipped_by_server: bool,
    pub pinned_by_user: bool,
    pub display_time: u32,
    pub sort_order: i64,
}

/// Partial update of the user controlled schedule flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallationFlags {
    pub pinned_by_user: Option<bool>,
    pub skipped_by_user: Option<bool>,
}
