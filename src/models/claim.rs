use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimType {
    Owner,
    Shared,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Owner => "OWNER",
            ClaimType::Shared => "SHARED",
        }
    }
}

impl FromStr for ClaimType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(ClaimType::Owner),
            "SHARED" => Ok(ClaimType::Shared),
            _ => Err(anyhow::format_err!("unknown claim type '{s}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClaim {
    pub device_id: String,
    pub user_id: String,
    pub claim_type: ClaimType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller already owned the device; nothing changed.
    AlreadyOwned,
    /// Previous claims, installations and settings were wiped and the caller is the owner.
    Transferred,
}
