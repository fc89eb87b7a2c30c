use crate::common::GatewayError;
use crate::extractors::DeviceIdentity;
use crate::services::connection;
use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::response::Response;

const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Every path except `/health` is a device socket endpoint.
pub async fn upgrade(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    identity: Result<DeviceIdentity, GatewayError>,
) -> Result<Response, GatewayError> {
    use tracing::Instrument;
    let Ok(ws) = ws else {
        return Err(GatewayError::NotFound);
    };
    let DeviceIdentity { device_id, family } = identity?;

    Ok(ws
        .max_frame_size(MAX_FRAME_SIZE)
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| {
            let span = tracing::info_span!(
                "device_connection",
                device_id = %device_id,
                family = %family,
            );
            connection::serve_socket(state, socket, device_id, family).instrument(span)
        }))
}
