//! ruleq server
//!
//! Loads queues, timers and rules from YAML, starts the engine runtime and
//! runs until interrupted.

mod config;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

const DEFAULT_CONFIG: &str = "configuration.yaml";

/// First CLI argument, then `RULEQ_CONFIG`, then `configuration.yaml`
fn config_path() -> PathBuf {
    env::args_os()
        .nth(1)
        .or_else(|| env::var_os("RULEQ_CONFIG"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let path = config_path();
    info!(path = %path.display(), "Starting ruleq");

    let config = AppConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    let actuators = config.actuator_registry();
    let engine = config
        .builder(actuators)
        .context("invalid engine configuration")?
        .start();

    info!(
        queues = config.queues.len(),
        timers = config.timers.len(),
        rules = config.rules.len(),
        "ruleq is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let stats = engine.handle().stats().await?;
    info!(
        passes = stats.passes,
        rules_fired = stats.rules_fired,
        items_added = stats.items_added,
        "Final engine stats"
    );
    engine.shutdown().await?;

    Ok(())
}
