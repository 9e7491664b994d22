//! wallet-watch - monitors wallets for token buys and publishes them

use anyhow::{Context, Result};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use wallet_watch::config::{self, DEFAULT_CONFIG_PATH};
use wallet_watch::publisher::{self, run_publisher};
use wallet_watch::{inputs, telemetry, MonitorBuilder};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = config::load_from_env_or_default(Path::new(DEFAULT_CONFIG_PATH))?;

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = telemetry::init_tracing(&config.logging)?;

    match &config_path {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("no {DEFAULT_CONFIG_PATH} found, using built-in defaults"),
    }
    config.validate()?;

    inputs::ensure_input_files(&config.input)?;
    let template = inputs::load_template(&config.input.template_file)?;
    let wallets = inputs::load_wallets(&config.input.wallets_file)?;
    if config.helius.api_key.is_empty() {
        warn!("helius.api_key is empty, metadata lookups will likely be rejected");
    }

    let publisher = publisher::from_config(&config.publisher)?;
    let monitor = MonitorBuilder::from_config(config.monitor_config()).build()?;

    // Create communication channels
    let (event_sender, event_receiver) = mpsc::unbounded_channel();

    let mut supervisors = JoinSet::new();
    for wallet in wallets.iter() {
        let supervisor = monitor.supervisor(wallet);
        let sender = event_sender.clone();
        supervisors.spawn(async move { supervisor.run(sender).await });
    }
    drop(event_sender);

    let publisher_handle = tokio::spawn(run_publisher(event_receiver, template, publisher));
    info!(wallets = wallets.len(), publisher = ?config.publisher.kind, "monitoring started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    supervisors.shutdown().await;
    let delivered = publisher_handle.await.context("publisher task failed")?;
    info!(delivered, "wallet-watch stopped");

    Ok(())
}
