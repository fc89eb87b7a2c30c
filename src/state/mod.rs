use crate::config::Config;
use crate::fanout::{self, FanoutBus};
use crate::services::claim::ClaimVerifier;
use crate::services::connection::ConnectionManager;
use crate::services::pki::{CertificateSigner, HttpCertificateSigner};
use crate::services::render::{AppRenderer, HttpAppRenderer};
use crate::store::{DeviceStore, SqliteDeviceStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a device session needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DeviceStore>,
    pub fanout: Arc<dyn FanoutBus>,
    pub renderer: Arc<dyn AppRenderer>,
    pub signer: Arc<dyn CertificateSigner>,
    pub claims: Arc<ClaimVerifier>,
    pub connections: Arc<ConnectionManager>,
    pub shutdown_signal: CancellationToken,
}

impl AppState {
    pub async fn build(
        config: Arc<Config>,
        shutdown_signal: CancellationToken,
    ) -> anyhow::Result<Self> {
        let store = SqliteDeviceStore::connect(&config.database.url).await?;
        let fanout = fanout::connect(config.fanout.redis_url.as_deref()).await?;
        let renderer = HttpAppRenderer::new(&config.renderer)?;
        let signer = HttpCertificateSigner::new(&config.signing)?;
        let claims = ClaimVerifier::new(config.claim.secret.as_deref());
        if config.claim.secret.is_none() {
            tracing::warn!("claim secret is not configured, device claims will fail");
        }
        if let Some(identity) = config.debug_identity() {
            tracing::warn!(identity, "debug identity override is active");
        }
        Ok(Self {
            config,
            store: Arc::new(store),
            fanout,
            renderer: Arc::new(renderer),
            signer: Arc::new(signer),
            claims: Arc::new(claims),
            connections: Arc::new(ConnectionManager::new()),
            shutdown_signal,
        })
    }
}
