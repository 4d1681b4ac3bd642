//! Birds Daemon - keeps a flock of voice identities moving
//!
//! `birdsd` loads one credential per bird, connects the flock, waits until
//! at least one bird is ready, snapshots every server's voice channels and
//! then ticks the flock once per interval until Ctrl+C or SIGTERM.

use clap::Parser;
use flock_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Birds Daemon CLI
#[derive(Parser)]
#[command(name = "birdsd")]
#[command(about = "Birds Daemon - flock coordination for voice identities", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BIRDS_CONFIG")]
    config: Option<String>,

    /// Credentials file path
    #[arg(long, env = "BIRDS_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "BIRDS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "BIRDS_LOG_JSON")]
    json: bool,

    /// Seed for the flock's random source
    #[arg(long, env = "BIRDS_SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(credentials) = cli.credentials {
        config.credentials = credentials;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        servers = config.playground.servers.len(),
        tick_interval_ms = config.driver.tick_interval_ms,
        "Starting birds daemon"
    );

    let server = Server::new(config)?;
    server.run().await
}
