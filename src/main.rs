//! # Attribution Engine Main Entry Point
//!
//! Loads configuration, prepares the database, and serves the HTTP API.

use std::sync::Arc;

use anyhow::Context;
use attribution_engine::{
    config::ConfigLoader,
    db, seeds,
    server::{AppState, run_server},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;

    init_tracing(&config).context("initializing tracing")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;
    seeds::seed_reference_data(&db).await?;

    let state = AppState::new(db, Arc::new(config));
    run_server(state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
