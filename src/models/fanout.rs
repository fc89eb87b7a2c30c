use serde::{Deserialize, Serialize};

pub const DEFAULT_RESET_REASON: &str = "Device deleted by owner";

pub fn channel(device_id: &str) -> String {
    format!("device:{device_id}")
}

/// Command routed to whichever replica holds the device's socket.
///
/// Apart from `FactoryReset::reason` and the legacy `RenderResult`, the payload
/// only tells the receiver what to re-read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutMessage {
    ScheduleUpdate {},
    SettingsUpdate {},
    FactoryReset {
        #[serde(default = "default_reason")]
        reason: String,
    },
    RenderResult {
        uuid: String,
        #[serde(default)]
        render_output: Option<String>,
    },
}

fn default_reason() -> String {
    DEFAULT_RESET_REASON.to_string()
}

impl FanoutMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            FanoutMessage::ScheduleUpdate {} => "schedule_update",
            FanoutMessage::SettingsUpdate {} => "settings_update",
            FanoutMessage::FactoryReset { .. } => "factory_reset",
            FanoutMessage::RenderResult { .. } => "render_result",
        }
    }

    pub fn to_json(&self) -> String {
        // serializing a tagged enum of plain strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}
