use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use paper_rag::core::config::{AppPaths, ConfigService};
use paper_rag::core::logging;
use paper_rag::server;
use paper_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths, "server.log");

    let config = ConfigService::new(paths.clone());
    match config.load_config() {
        Ok(value) => tracing::info!(
            "Effective config (before env overrides): {}",
            config.redact_sensitive_values(&value)
        ),
        Err(err) => tracing::warn!("Failed to read config files: {}", err),
    }

    let state = AppState::initialize(paths).await?;
    if let Err(err) = state.settings.require_serving() {
        tracing::warn!("Chat requests will be refused until configured: {}", err);
    }

    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
