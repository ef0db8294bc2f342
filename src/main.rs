//! Channel Exporter CLI - main entry point
//!
//! Exports the full history of one Discord channel. Runs with no arguments;
//! everything comes from config.yml / .env / the environment unless overridden.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use channel_exporter::config::CONFIG_PATHS;
use channel_exporter::{commands, metrics, Config};

#[derive(Parser)]
#[command(name = "channel_exporter")]
#[command(about = "Export the full message history of a Discord channel", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a YAML config file (default: ./config.yml or ../config.yml)
    #[arg(short, long, env = "CHANNEL_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Channel ID to export (overrides config)
    #[arg(long)]
    channel: Option<String>,

    /// Output directory (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("channel_exporter=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => Config::load_from_file(path),
        None => Config::discover(&CONFIG_PATHS),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            std::process::exit(commands::EXIT_FAILURE);
        }
    };
    if let Some(channel) = cli.channel {
        config.channel_id = channel;
    }
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let result = commands::export_run(&config).await;
    match &result {
        Ok(_) => return Ok(()),
        Err(err) if err.is_invalid_channel() => error!("Invalid or non-text channel: {}", err),
        Err(err) => error!("Export failed: {}", err),
    }
    std::process::exit(commands::exit_code(&result));
}
