//! Main entry point for the scrimmage matchmaking engine
//!
//! Production entry point: loads configuration, wires the default match
//! profile, runs the match loop and the frontend, and shuts down
//! gracefully on SIGINT.

use anyhow::Result;
use clap::Parser;
use scrimmage::config::AppConfig;
use scrimmage::pipeline::{RandomAssigner, Simple1v1MatchFunction};
use scrimmage::pool::Pool;
use scrimmage::service::AppState;
use scrimmage::types::MatchProfile;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Scrimmage Matchmaking Engine
#[derive(Parser)]
#[command(
    name = "scrimmage",
    version,
    about = "A matchmaking engine for multiplayer game sessions",
    long_about = "Scrimmage groups matchmaking tickets into matches with pluggable match \
                 functions on a periodic backend loop, assigns gameserver endpoints, and \
                 streams assignments back to waiting clients over a shared store."
)]
struct Args {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Store URL override (empty selects the in-process store)
    #[arg(long, value_name = "URL")]
    store_url: Option<String>,

    /// Frontend port override
    #[arg(long, value_name = "PORT")]
    frontend_port: Option<u16>,

    /// Validate configuration and exit without starting the engine
    #[arg(long)]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let level: tracing::Level = log_level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level: {log_level}"))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .init();

    Ok(())
}

/// Default profile: one unfiltered pool matched by the built-in 1v1
/// function.
fn default_profile() -> MatchProfile {
    MatchProfile::new("simple-1vs1", vec![Pool::unfiltered("test-pool")])
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(log_level) = args.log_level {
        config.service.log_level = log_level;
    }
    if let Some(store_url) = args.store_url {
        config.store.url = store_url;
    }
    if let Some(port) = args.frontend_port {
        config.service.frontend_port = port;
    }

    init_logging(&config.service.log_level)?;

    if args.dry_run {
        info!("configuration valid; exiting (dry run)");
        return Ok(());
    }

    info!("scrimmage {} starting", scrimmage::VERSION);

    let mut state = AppState::new(config, Arc::new(RandomAssigner), None).await?;
    state.register_match_function(default_profile(), Arc::new(Simple1v1MatchFunction));
    state.start()?;

    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for shutdown signal: {}", e),
    }

    state.shutdown().await?;
    Ok(())
}
