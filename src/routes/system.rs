use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connectedDevices": state.connections.connected_devices(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
