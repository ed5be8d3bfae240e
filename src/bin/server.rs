//! Headless candle aggregation server: no HTTP, no UI. Suitable for
//! container/service deployments, same "no incoming connections" posture as
//! the teacher's own headless server binary.
//!
//! # Environment Variables
//! See [`candle_aggregator::config::Config::from_env`] for the full list
//! (`RING_BUFFER_SIZE`, `DATABASE_URL`, `SYMBOLS`, ...).

use candle_aggregator::application::Application;
use candle_aggregator::config::Config;
use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Candle aggregation pipeline server", long_about = None)]
struct Cli {
    /// Path to a .env file to load before reading configuration.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Override the log level (error|warn|info|debug|trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::from_filename(&cli.env_file).ok();

    let default_level = cli.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("candle-aggregator {} starting", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    info!(symbols = ?config.symbols, ring_buffer_size = config.ring_buffer_size, "configuration loaded");

    let app = match Application::build(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to start pipeline");
            std::process::exit(1);
        }
    };

    info!("pipeline running; press Ctrl+C to shut down");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::process::exit(1);
    }

    info!("shutdown signal received, draining consumer thread");
    app.shutdown();
    info!("shutdown complete");
}
