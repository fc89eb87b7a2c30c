use super::DeviceFamily;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub device_id: String,
    pub display_name: String,
    /// Family specific blob, see [`MatrxSettings`] and [`LanternSettings`].
    pub type_settings: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrxSettings {
    pub screen_enabled: bool,
    pub screen_brightness: u32,
    pub auto_brightness_enabled: bool,
    pub screen_off_lux: u32,
}

impl Default for MatrxSettings {
    fn default() -> Self {
        Self {
            screen_enabled: true,
            screen_brightness: 128,
            auto_brightness_enabled: false,
            screen_off_lux: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LanternSettings {
    pub brightness: u32,
    pub sleep_start: u32,
    pub sleep_end: u32,
}

impl Default for LanternSettings {
    fn default() -> Self {
        Self {
            brightness: 255,
            sleep_start: 0,
            sleep_end: 0,
        }
    }
}

pub fn default_type_settings(family: DeviceFamily) -> serde_json::Value {
    let value = match family {
        DeviceFamily::Lantern => serde_json::to_value(LanternSettings::default()),
        DeviceFamily::Matrx => serde_json::to_value(MatrxSettings::default()),
    };
    value.unwrap_or(serde_json::Value::Null)
}

impl DeviceSettings {
    /// `None` when the stored blob does not have the Matrx shape.
    pub fn matrx(&self) -> Option<MatrxSettings> {
        serde_json::from_value(self.type_settings.clone()).ok()
    }
}
