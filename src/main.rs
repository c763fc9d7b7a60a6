use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use helpdesk_rag::core::config::{AppPaths, ConfigService};
use helpdesk_rag::core::logging;
use helpdesk_rag::server;
use helpdesk_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables win
    let _ = dotenvy::dotenv();

    let paths = Arc::new(AppPaths::new());
    let config = ConfigService::new(paths.clone())
        .load()
        .context("Failed to load configuration")?;
    logging::init(&paths, &config.logging.level).context("Failed to initialize logging")?;
    paths
        .ensure_dirs()
        .context("Failed to create data directories")?;
    tracing::info!("Effective configuration: {}", config.redacted());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::initialize(paths, config).await?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
}
