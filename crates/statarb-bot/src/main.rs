//! Pair-trading engine entry point.
//!
//! Runs against the simulation backend; a live broker bridge plugs in
//! through the `Broker` trait without touching the engine.

use anyhow::Result;
use clap::Parser;
use statarb_bot::{AppConfig, Engine};
use statarb_broker::SimBroker;
use std::sync::Arc;
use tracing::info;

/// Statistical-arbitrage pair-trading engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via STATARB_CONFIG)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    statarb_telemetry::init_logging()?;

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("STATARB_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::from_file(&config_path)?;
    info!(
        primary = %config.pair.primary_symbol,
        secondary = %config.pair.secondary_symbol,
        "Configuration loaded"
    );

    let broker = Arc::new(SimBroker::with_pair(
        &config.pair.primary_symbol,
        &config.pair.secondary_symbol,
    ));

    let mut engine = Engine::new(config, broker).await?;
    engine.recover().await?;
    engine.start()?;

    tokio::signal::ctrl_c().await?;
    engine.shutdown().await;

    Ok(())
}
