use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct FanoutConfig {
    /// Redis pub/sub address. The in-process bus is used when absent.
    pub redis_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ClaimConfig {
    /// HMAC secret for claim tokens. Every claim fails when absent.
    pub secret: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SigningConfig {
    pub base_url: String,
    pub secret: Option<String>,
    #[serde(default = "default_signing_role")]
    pub role: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SigningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RendererConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RendererConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DebugConfig {
    pub identity: Option<String>,
}

fn default_signing_role() -> String {
    "koios-factory".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}
