use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Device identity is missing from the connection.")]
    IdentityMissing,
    #[error("Device identity '{0}' does not name a known device family.")]
    UnknownFamily(String),
    #[error("Device identity header is malformed: {0}")]
    MalformedIdentity(String),
    #[error("Not found")]
    NotFound,
    #[error("An internal error occurred. Please try again later.")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::IdentityMissing => StatusCode::UNAUTHORIZED,
            GatewayError::UnknownFamily(_) | GatewayError::MalformedIdentity(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Internal(err) => {
                tracing::error!("{:?}", err);
                err.chain()
                    .skip(1)
                    .for_each(|cause| tracing::error!("Because: {}", cause));
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status != StatusCode::NOT_FOUND {
            tracing::warn!(%status, "rejected device upgrade: {}", self);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_errors_map_to_client_statuses() {
        assert_eq!(
            GatewayError::IdentityMissing.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::UnknownFamily("TOASTER-1".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
