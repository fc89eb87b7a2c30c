use anyhow::{Context, anyhow};
use serde::Deserialize;

mod gateway_config;
mod logs_config;

pub use gateway_config::{
    ClaimConfig, DatabaseConfig, DebugConfig, FanoutConfig, RendererConfig, ServerConfig,
    SigningConfig,
};
pub use logs_config::LogsConfig;

const PRODUCTION: &str = "production";

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    pub server: ServerConfig,
    pub logs: LogsConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub claim: ClaimConfig,
    pub signing: SigningConfig,
    pub renderer: RendererConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

fn default_environment() -> String {
    PRODUCTION.to_string()
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION)
    }

    /// Fixed device identity used instead of the certificate headers.
    ///
    /// Never honoured in production.
    pub fn debug_identity(&self) -> Option<&str> {
        if self.is_production() {
            return None;
        }
        self.debug
            .identity
            .as_deref()
            .filter(|identity| !identity.is_empty())
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).with_context(|| {
            "Error: Failed to parse configuration file.\n\
        Please check the file syntax is valid TOML syntax"
        })
    }
}

fn parse_config_path() -> anyhow::Result<std::path::PathBuf> {
    let mut args = std::env::args();
    args.next();
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return match args.next() {
                Some(path) => Ok(std::path::Path::new(&path).to_path_buf()),
                None => Err(anyhow!(
                    "Error: Please specify path string for -c argument."
                )),
            };
        }
    }
    Err(anyhow!(
        "Error: Please specify configuration file argument. Usage: -c <config_file>"
    ))
}

pub fn load() -> anyhow::Result<Config> {
    let path = parse_config_path()?;
    if !path.is_file() {
        return Err(anyhow!(
            "Error: Configuration file not found or invalid.\n\
        Please make sure that the configuration file exists and is a valid TOML file.\n\
        Expected file path: {:?}",
            path
        ));
    }
    let content = std::fs::read_to_string(path).with_context(|| {
        "Error: Failed to read configuration file.\n\
        Please check the file path and file permissions, and make sure the file is valid accessible"
    })?;
    Config::from_toml_str(&content)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
        environment = "development"

        [server]
        host = "127.0.0.1"
        port = 9091

        [logs]
        level = "debug"

        [database]
        url = "sqlite::memory:"

        [claim]
        secret = "claim-secret"

        [signing]
        base_url = "http://127.0.0.1:1"
        secret = "signing-secret"

        [renderer]
        base_url = "http://127.0.0.1:1"
        timeout_secs = 2

        [debug]
        identity = "MATRX-B43A45B0C418"
    "#;

    pub(crate) fn sample() -> Config {
        Config::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn parses_full_config() {
        let config = sample();
        assert_eq!(config.server.port, 9091);
        assert_eq!(config.logs.level, tracing::Level::DEBUG);
        assert!(config.fanout.redis_url.is_none());
        assert_eq!(config.signing.role, "koios-factory");
        assert_eq!(config.signing.timeout_secs, 10);
        assert_eq!(config.renderer.timeout_secs, 2);
    }

    #[test]
    fn debug_identity_is_gated_by_environment() {
        let mut config = sample();
        assert_eq!(config.debug_identity(), Some("MATRX-B43A45B0C418"));
        config.environment = "Production".to_string();
        assert_eq!(config.debug_identity(), None);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let content = SAMPLE.replace(r#"level = "debug""#, r#"level = "loud""#);
        assert!(Config::from_toml_str(&content).is_err());
    }
}
