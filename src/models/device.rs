use crate::common::GatewayError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// A device counts as online when it was seen within this window.
pub const ONLINE_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceFamily {
    Lantern,
    Matrx,
}

impl DeviceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::Lantern => "LANTERN",
            DeviceFamily::Matrx => "MATRX",
        }
    }

    /// Derives the family from the identity prefix, e.g. `MATRX-B43A45B0C418`.
    pub fn from_identity(identity: &str) -> Result<Self, GatewayError> {
        let prefix = identity.split('-').next().unwrap_or_default();
        prefix
            .to_uppercase()
            .parse()
            .map_err(|_| GatewayError::UnknownFamily(identity.to_string()))
    }
}

impl FromStr for DeviceFamily {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LANTERN" => Ok(DeviceFamily::Lantern),
            "MATRX" => Ok(DeviceFamily::Matrx),
            _ => Err(anyhow::format_err!("unknown device family '{s}'")),
        }
    }
}

impl Display for DeviceFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub width: u32,
    pub height: u32,
    pub has_light_sensor: bool,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub family: DeviceFamily,
    pub last_seen_at: DateTime<Utc>,
    pub info: Option<DeviceInfo>,
    pub currently_displaying_installation_id: Option<Uuid>,
}

impl Device {
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_seen_at) < Duration::seconds(ONLINE_WINDOW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_comes_from_identity_prefix() {
        assert_eq!(
            DeviceFamily::from_identity("MATRX-B43A45B0C418").unwrap(),
            DeviceFamily::Matrx
        );
        assert_eq!(
            DeviceFamily::from_identity("lantern-0011").unwrap(),
            DeviceFamily::Lantern
        );
        assert!(matches!(
            DeviceFamily::from_identity("TOASTER-01"),
            Err(GatewayError::UnknownFamily(_))
        ));
        assert!(DeviceFamily::from_identity("").is_err());
    }

    #[test]
    fn online_is_derived_from_last_seen() {
        let now = Utc::now();
        let mut device = Device {
            id: "MATRX-1".into(),
            family: DeviceFamily::Matrx,
            last_seen_at: now - Duration::seconds(59),
            info: None,
            currently_displaying_installation_id: None,
        };
        assert!(device.is_online(now));
        device.last_seen_at = now - Duration::seconds(61);
        assert!(!device.is_online(now));
    }
}
