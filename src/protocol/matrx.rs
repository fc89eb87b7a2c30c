use super::common::*;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MatrxMessage {
    #[prost(
        oneof = "matrx_message::Message",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19"
    )]
    pub message: Option<matrx_message::Message>,
}

pub mod matrx_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        JoinResponse(super::JoinResponse),
        #[prost(message, tag = "2")]
        ScheduleRequest(super::ScheduleRequest),
        #[prost(message, tag = "3")]
        Schedule(super::Schedule),
        #[prost(message, tag = "4")]
        AppRenderRequest(super::AppRenderRequest),
        #[prost(message, tag = "5")]
        AppRenderResponse(super::AppRenderResponse),
        #[prost(message, tag = "6")]
        ScheduleItemSetPinState(super::ScheduleItemSetPinState),
        #[prost(message, tag = "7")]
        ScheduleItemSetSkipState(super::ScheduleItemSetSkipState),
        #[prost(message, tag = "8")]
        DeviceConfigRequest(super::DeviceConfigRequest),
        #[prost(message, tag = "9")]
        DeviceConfig(super::DeviceConfig),
        #[prost(message, tag = "10")]
        UploadCoreDump(super::UploadCoreDump),
        #[prost(message, tag = "11")]
        ClaimDevice(super::ClaimDevice),
        #[prost(message, tag = "12")]
        CurrentlyDisplayingApp(super::CurrentlyDisplayingApp),
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

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScheduleRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScheduleItem {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub display_time: u32,
    #[prost(bool, tag = "3")]
    pub pinned: bool,
    #[prost(bool, tag = "4")]
    pub skipped: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schedule {
    #[prost(message, repeated, tag = "1")]
    pub schedule_items: Vec<ScheduleItem>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppRenderRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub app_uuid: Vec<u8>,
    /// SHA-256 of the render the device already holds, empty if none.
    #[prost(bytes = "vec", tag = "2")]
    pub data_sha256: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppRenderResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub app_uuid: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub data_sha256: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub error: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScheduleItemSetPinState {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub pinned: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScheduleItemSetSkipState {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub skipped: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceConfigRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceConfig {
    #[prost(bool, tag = "1")]
    pub screen_enabled: bool,
    #[prost(uint32, tag = "2")]
    pub screen_brightness: u32,
    #[prost(bool, tag = "3")]
    pub auto_brightness_enabled: bool,
    #[prost(uint32, tag = "4")]
    pub screen_off_lux: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CurrentlyDisplayingApp {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
}

impl From<CommonReply> for matrx_message::Message {
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

impl From<matrx_message::Message> for MatrxMessage {
    fn from(message: matrx_message::Message) -> Self {
        Self {
            message: Some(message),
        }
    }
}
