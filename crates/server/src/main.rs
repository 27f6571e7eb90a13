//! lantern server entry point.
//!
//! Boots the worker against the configured origin, runs install and activate,
//! then proxies every request on `listen_addr` through it.
//! Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use lantern_client::{FetchConfig, HttpFetcher};
use lantern_core::{AppConfig, CacheDb, LocalRegistration, ServiceWorker};

mod error;
mod handler;
mod upstream;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let worker_config = config.worker_config()?;

    tracing::info!(
        origin = %worker_config.origin,
        generation = %worker_config.generation,
        db_path = %config.db_path.display(),
        "starting lantern"
    );

    let storage = Arc::new(CacheDb::open(&config.db_path).await?);
    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);
    let worker = Arc::new(ServiceWorker::new(
        worker_config,
        fetcher.clone(),
        storage,
        Arc::new(LocalRegistration::default()),
    ));

    // A redundant worker still proxies; every request passes through.
    if let Err(e) = worker.start().await {
        tracing::warn!(error = %e, "worker is not controlling, serving pass-through only");
    }

    let state = handler::ProxyState::new(Arc::clone(&worker), fetcher, config.max_bytes);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(listen_addr = %config.listen_addr, "listening");

    axum::serve(listener, handler::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.settle().await;
    tracing::info!("shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
