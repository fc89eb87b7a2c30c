use super::common::*;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LanternMessage {
    #[prost(
        oneof = "lantern_message::Message",
        tags = "1, 10, 11, 13, 14, 15, 16, 17, 18, 19"
    )]
    pub message: Option<lantern_message::Message>,
}

/// Lantern reuses the Matrx field numbers for the cases it shares.
pub mod lantern_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        JoinResponse(super::JoinResponse),
        #[prost(message, tag = "10")]
        UploadCoreDump(super::UploadCoreDump),
        #[prost(message, tag = "11")]
        ClaimDevice(super::ClaimDevice),
        #[prost(message, tag = "13")]
        DeviceInfo(super::DeviceInfo),
        #[prost(message, tag = "14")]
        CommandResult(super::CommandResult),
        #[prost(message, tag = "15")]
        CertReport(super::CertReport),
        #[prost(message, tag = "16")]
        CertRenewRequest(super::CertRenewRequest),
        #[prost(message, tag = "17")]
        CertRenewRequired(super::CertRenewRequired),
        #[prost(message, tag = "18")]
        CertRenewResponse(super::CertRenewResponse),
        #[prost(message, tag = "19")]
        FactoryReset(super::FactoryReset),
    }
}

impl From<CommonReply> for lantern_message::Message {
    fn from(reply: CommonReply) -> Self {
        match reply {
            CommonReply::JoinResponse(v) => Self::JoinResponse(v),
            CommonReply::CommandResult(v) => Self::CommandResult(v),
            CommonReply::CertRenewRequired(v) => Self::CertRenewRequired(v),
            CommonReply::CertRenewResponse(v) => Self::CertRenewResponse(v),
            CommonReply::FactoryReset(v) => Self::FactoryReset(v),
        }
    }
}

impl From<lantern_message::Message> for LanternMessage {
    fn from(message: lantern_message::Message) -> Self {
        Self {
            message: Some(message),
        }
    }
}
