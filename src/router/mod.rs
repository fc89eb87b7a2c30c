//! Per family dispatch of inbound frames and fanout commands.

pub mod common;
pub mod lantern;
pub mod matrx;

use crate::models::{DeviceFamily, FanoutMessage};
use crate::services::connection::Session;
use crate::state::AppState;

pub async fn handle_frame(state: &AppState, session: &Session, frame: &[u8]) -> anyhow::Result<()> {
    match session.family {
        DeviceFamily::Matrx => matrx::handle_frame(state, session, frame).await,
        DeviceFamily::Lantern => lantern::handle_frame(state, session, frame).await,
    }
}

pub async fn handle_fanout(
    state: &AppState,
    session: &Session,
    message: FanoutMessage,
) -> anyhow::Result<()> {
    tracing::debug!(device_id = %session.device_id, kind = message.kind(), "fanout received");
    match session.family {
        DeviceFamily::Matrx => matrx::handle_fanout(state, session, message).await,
        DeviceFamily::Lantern => lantern::handle_fanout(session, message).await,
    }
}
