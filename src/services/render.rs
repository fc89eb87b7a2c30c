use crate::config::RendererConfig;
use crate::models::DeviceInfo;
use crate::protocol::{self, matrx::AppRenderRequest, matrx::AppRenderResponse};
use crate::store::DeviceStore;
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Dimensions assumed for devices that have not reported their panel yet.
pub const DEFAULT_DIMENSIONS: (u32, u32) = (64, 32);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("renderer answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("renderer response carries no output")]
    MissingOutput,
    #[error("renderer output is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

pub struct RenderRequest<'a> {
    pub app_id: &'a str,
    pub params: &'a serde_json::Value,
    pub width: u32,
    pub height: u32,
    pub device_id: &'a str,
}

#[async_trait]
pub trait AppRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError>;
}

#[derive(Deserialize)]
struct RenderEnvelope {
    result: RenderOutput,
}

#[derive(Deserialize)]
struct RenderOutput {
    #[serde(default)]
    render_output: Option<String>,
}

pub struct HttpAppRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAppRenderer {
    pub fn new(config: &RendererConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build renderer client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AppRenderer for HttpAppRenderer {
    async fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
        let url = format!("{}/apps/{}/render", self.base_url, request.app_id);
        let response = self
            .client
            .post(url)
            .query(&[
                ("width", request.width.to_string()),
                ("height", request.height.to_string()),
                ("device_id", request.device_id.to_string()),
            ])
            .json(request.params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: RenderEnvelope = response.json().await?;
        let output = envelope
            .result
            .render_output
            .ok_or(RenderError::MissingOutput)?;
        Ok(STANDARD.decode(output)?)
    }
}

/// Renders the requested installation unless the device already holds the
/// same bytes.
///
/// Every failure is logged and answered with silence; the device retries on
/// its own schedule.
pub async fn handle_app_render_request(
    store: &dyn DeviceStore,
    renderer: &dyn AppRenderer,
    device_id: &str,
    request: &AppRenderRequest,
) -> Option<AppRenderResponse> {
    let installation_id = match protocol::uuid_from_bytes(&request.app_uuid) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(device_id, "render request with bad app uuid: {}", err);
            return None;
        }
    };
    let installation = match store.find_installation(device_id, installation_id).await {
        Ok(Some(installation)) => installation,
        Ok(None) => {
            tracing::warn!(device_id, %installation_id, "render request for unknown installation");
            return None;
        }
        Err(err) => {
            tracing::error!(device_id, %installation_id, "failed to load installation: {}", err);
            return None;
        }
    };
    let info = match store.get_device(device_id).await {
        Ok(device) => device.and_then(|it| it.info),
        Err(err) => {
            tracing::warn!(device_id, "failed to load device dimensions: {}", err);
            None
        }
    };
    let (width, height) = dimensions(info);
    let render = RenderRequest {
        app_id: &installation.config.app_id,
        params: &installation.config.params,
        width,
        height,
        device_id,
    };
    let data = match renderer.render(&render).await {
        Ok(data) => data,
        Err(err) => {
            tracing::error!(
                device_id,
                %installation_id,
                app_id = %installation.config.app_id,
                "render failed: {}",
                err
            );
            return None;
        }
    };
    let data_sha256 = Sha256::digest(&data).to_vec();
    if data_sha256 == request.data_sha256 {
        tracing::debug!(device_id, %installation_id, "render unchanged, reply suppressed");
        return None;
    }
    Some(AppRenderResponse {
        app_uuid: request.app_uuid.clone(),
        data,
        data_sha256,
        error: false,
    })
}

fn dimensions(info: Option<DeviceInfo>) -> (u32, u32) {
    match info {
        Some(info) if info.width > 0 && info.height > 0 => (info.width, info.height),
        _ => DEFAULT_DIMENSIONS,
    }
}

/// Builds a response from a `render_result` published by an older worker.
pub fn legacy_render_response(uuid: &str, render_output: Option<&str>) -> AppRenderResponse {
    let app_uuid = uuid::Uuid::parse_str(uuid)
        .map(|it| protocol::uuid_to_bytes(&it))
        .unwrap_or_default();
    let data = render_output
        .filter(|it| !it.is_empty())
        .and_then(|it| STANDARD.decode(it).ok())
        .filter(|it| !it.is_empty());
    match data {
        Some(data) => AppRenderResponse {
            app_uuid,
            data_sha256: Sha256::digest(&data).to_vec(),
            data,
            error: false,
        },
        None => AppRenderResponse {
            app_uuid,
            data: Vec::new(),
            data_sha256: Vec::new(),
            error: true,
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::DeviceFamily;
    use crate::store::SqliteDeviceStore;
    use std::sync::Mutex;

    const DEVICE: &str = "MATRX-B43A45B0C418";

    /// Answers with fixed bytes and records every call.
    pub(crate) struct StubRenderer {
        pub output: Option<Vec<u8>>,
        pub calls: Mutex<Vec<(String, u32, u32, serde_json::Value)>>,
    }

    impl StubRenderer {
        pub(crate) fn returning(output: &[u8]) -> Self {
            Self {
                output: Some(output.to_vec()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                output: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AppRenderer for StubRenderer {
        async fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
            self.calls.lock().unwrap().push((
                request.app_id.to_string(),
                request.width,
                request.height,
                request.params.clone(),
            ));
            self.output.clone().ok_or(RenderError::MissingOutput)
        }
    }

    async fn store_with_installation() -> (SqliteDeviceStore, uuid::Uuid) {
        let store = SqliteDeviceStore::connect_in_memory().await;
        store.upsert_device(DEVICE, DeviceFamily::Matrx).await.unwrap();
        let id = store.insert_installation(DEVICE, "clock", 0).await;
        (store, id)
    }

    fn request(id: uuid::Uuid, data_sha256: Vec<u8>) -> AppRenderRequest {
        AppRenderRequest {
            app_uuid: protocol::uuid_to_bytes(&id),
            data_sha256,
        }
    }

    #[tokio::test]
    async fn fresh_render_is_sent_with_hash() {
        let (store, id) = store_with_installation().await;
        let renderer = StubRenderer::returning(b"webp-bytes");

        let response = handle_app_render_request(&store, &renderer, DEVICE, &request(id, vec![]))
            .await
            .unwrap();
        assert_eq!(response.data, b"webp-bytes");
        assert_eq!(response.data_sha256, Sha256::digest(b"webp-bytes").to_vec());
        assert_eq!(response.app_uuid, protocol::uuid_to_bytes(&id));
        assert!(!response.error);

        let calls = renderer.calls.lock().unwrap();
        assert_eq!(calls[0].0, "clock");
        assert_eq!((calls[0].1, calls[0].2), DEFAULT_DIMENSIONS);
        assert_eq!(calls[0].3, serde_json::json!({ "color": "red" }));
    }

    #[tokio::test]
    async fn unchanged_render_is_suppressed() {
        let (store, id) = store_with_installation().await;
        let renderer = StubRenderer::returning(b"webp-bytes");
        let known = Sha256::digest(b"webp-bytes").to_vec();

        let response =
            handle_app_render_request(&store, &renderer, DEVICE, &request(id, known)).await;
        assert!(response.is_none());
        assert_eq!(renderer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reported_dimensions_are_used() {
        let (store, id) = store_with_installation().await;
        store
            .update_device_info(
                DEVICE,
                DeviceInfo {
                    width: 128,
                    height: 64,
                    has_light_sensor: false,
                },
            )
            .await
            .unwrap();
        let renderer = StubRenderer::returning(b"x");
        handle_app_render_request(&store, &renderer, DEVICE, &request(id, vec![])).await;
        let calls = renderer.calls.lock().unwrap();
        assert_eq!((calls[0].1, calls[0].2), (128, 64));
    }

    #[tokio::test]
    async fn failures_produce_no_reply() {
        let (store, id) = store_with_installation().await;

        let failing = StubRenderer::failing();
        assert!(
            handle_app_render_request(&store, &failing, DEVICE, &request(id, vec![]))
                .await
                .is_none()
        );

        let renderer = StubRenderer::returning(b"x");
        let unknown = request(uuid::Uuid::new_v4(), vec![]);
        assert!(
            handle_app_render_request(&store, &renderer, DEVICE, &unknown)
                .await
                .is_none()
        );
        let malformed = AppRenderRequest {
            app_uuid: vec![1, 2, 3],
            data_sha256: vec![],
        };
        assert!(
            handle_app_render_request(&store, &renderer, DEVICE, &malformed)
                .await
                .is_none()
        );
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn legacy_result_flags_missing_output() {
        let id = uuid::Uuid::new_v4();
        let ok = legacy_render_response(&id.to_string(), Some(&STANDARD.encode(b"frame")));
        assert!(!ok.error);
        assert_eq!(ok.data, b"frame");
        assert_eq!(ok.app_uuid, protocol::uuid_to_bytes(&id));

        assert!(legacy_render_response(&id.to_string(), None).error);
        assert!(legacy_render_response(&id.to_string(), Some("")).error);
        assert!(legacy_render_response(&id.to_string(), Some("%%%")).error);
    }
}
