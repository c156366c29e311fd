//! container-test-manager -- launch containers with docker or podman, run a
//! test command inside them, and track each execution asynchronously.
//!
//! This crate provides the execution lifecycle engine (registry, runtime
//! backends, driver) and the HTTP API that exposes it.

pub mod api;
pub mod backend;
pub mod config;
pub mod execution;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::execution::{ExecutionDriver, ExecutionRegistry};

/// Wire a driver for the configured backend around a fresh, empty registry.
pub fn build_driver(config: &AppConfig) -> ExecutionDriver {
    let kind = config.backend_kind();
    let backend = backend::build(kind, config.status_timeout());
    ExecutionDriver::new(
        ExecutionRegistry::new(),
        backend,
        config.driver_settings(),
    )
}

/// Start the API server and serve until Ctrl-C.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let driver = build_driver(config);
    tracing::info!(backend = driver.backend_name(), "Container backend selected");

    let app = api::router(api::state::AppState::new(driver));

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, "container-test-manager listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
