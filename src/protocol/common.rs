//! Messages shared by every device family.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JoinResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(bool, tag = "2")]
    pub is_claimed: bool,
    #[prost(bool, tag = "3")]
    pub needs_claimed: bool,
}

impl JoinResponse {
    pub fn new(success: bool, is_claimed: bool) -> Self {
        Self {
            success,
            is_claimed,
            needs_claimed: !is_claimed,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClaimDevice {
    #[prost(bytes = "vec", tag = "1")]
    pub claim_token: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadCoreDump {
    #[prost(string, tag = "1")]
    pub firmware_project: String,
    #[prost(string, tag = "2")]
    pub firmware_version: String,
    #[prost(string, tag = "3")]
    pub firmware_variant: String,
    #[prost(bytes = "vec", tag = "4")]
    pub core_dump: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceInfo {
    #[prost(uint32, tag = "1")]
    pub width: u32,
    #[prost(uint32, tag = "2")]
    pub height: u32,
    #[prost(bool, tag = "3")]
    pub has_light_sensor: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandResult {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub error: String,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CertReport {
    /// PEM text of the certificate the device currently presents.
    #[prost(bytes = "vec", tag = "1")]
    pub current_cert: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CertRenewRequest {
    /// PEM text of the certificate signing request.
    #[prost(bytes = "vec", tag = "1")]
    pub csr: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CertRenewRequired {
    #[prost(string, tag = "1")]
    pub reason: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CertRenewResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(bytes = "vec", tag = "2")]
    pub device_cert: Vec<u8>,
    #[prost(string, tag = "3")]
    pub error: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FactoryReset {
    #[prost(string, tag = "1")]
    pub reason: String,
}

/// Replies produced by handlers shared across families.
///
/// Each family router wraps these into its own envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum CommonReply {
    JoinResponse(JoinResponse),
    CommandResult(CommandResult),
    CertRenewRequired(CertRenewRequired),
    CertRenewResponse(CertRenewResponse),
    FactoryReset(FactoryReset),
}
