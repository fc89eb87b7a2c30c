use super::common;
use crate::models::FanoutMessage;
use crate::protocol::lantern_message::Message;
use crate::protocol::{FactoryReset, LanternMessage};
use crate::services::connection::Session;
use crate::state::AppState;
use anyhow::Context;
use prost::Message as _;

pub async fn handle_frame(state: &AppState, session: &Session, frame: &[u8]) -> anyhow::Result<()> {
    let device_id = session.device_id.as_str();
    let envelope = LanternMessage::decode(frame).context("Undecodable Lantern frame")?;
    let Some(message) = envelope.message else {
        tracing::warn!(device_id, bytes = frame.len(), "ignoring Lantern frame with unknown case");
        return Ok(());
    };
    let reply = match message {
        Message::UploadCoreDump(dump) => {
            common::upload_core_dump(device_id, &dump);
            None
        }
        Message::ClaimDevice(request) => Some(common::claim_device(state, device_id, request).await),
        Message::DeviceInfo(info) => Some(common::device_info(state, device_id, info).await),
        Message::CertReport(report) => common::cert_report(device_id, &report),
        Message::CertRenewRequest(request) => {
            Some(common::cert_renew(state, device_id, &request).await)
        }
        Message::CommandResult(result) => {
            tracing::debug!(device_id, success = result.success, error = %result.error, "device command result");
            None
        }
        Message::JoinResponse(_)
        | Message::CertRenewRequired(_)
        | Message::CertRenewResponse(_)
        | Message::FactoryReset(_) => {
            tracing::warn!(device_id, "ignoring server-only message sent by device");
            None
        }
    };
    if let Some(reply) = reply {
        session.send_lantern(reply.into()).await;
    }
    Ok(())
}

/// Lantern only acts on factory resets; its schedule and settings are
/// not pushed by the server.
pub async fn handle_fanout(session: &Session, message: FanoutMessage) -> anyhow::Result<()> {
    let device_id = session.device_id.as_str();
    match message {
        FanoutMessage::FactoryReset { reason } => {
            tracing::info!(device_id, reason = %reason, "sending factory reset");
            session
                .send_lantern(Message::FactoryReset(FactoryReset { reason }))
                .await;
        }
        other => {
            tracing::debug!(device_id, kind = other.kind(), "fanout not handled for Lantern");
        }
    }
    Ok(())
}
