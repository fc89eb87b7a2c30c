use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;

mod common;
mod config;
mod extractors;
mod fanout;
mod logging;
mod models;
mod protocol;
mod router;
mod routes;
mod server;
mod services;
mod state;
mod store;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load()?;
    logging::registry_logs(&config.logs)?;
    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        environment = %config.environment,
        "Listening on http://{}",
        addr
    );
    server::run_until_done(Arc::new(config), listener).await
}
