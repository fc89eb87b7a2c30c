use crate::config::LogsConfig;
use tracing_subscriber::Layer;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

const CRATE_TARGET: &str = "lumen_gateway";

pub fn registry_logs(config: &LogsConfig) -> anyhow::Result<()> {
    let level = config.level_filter();
    let gateway_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(level)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target().starts_with(CRATE_TARGET)
        }));
    let access_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_target(false)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target().starts_with("tower_http")
        }));
    let general_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(filter::LevelFilter::INFO)
        .with_filter(filter::filter_fn(|metadata| {
            let target = metadata.target();
            !target.starts_with(CRATE_TARGET) && !target.starts_with("tower_http")
        }));
    tracing_subscriber::registry()
        .with(gateway_layer)
        .with(access_layer)
        .with(general_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
