use std::path::PathBuf;

use adsink::config::{CliOverrides, Config};
use adsink::proxy;
use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adsink")]
#[command(about = "Ad-blocking DNS proxy", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Upstream DNS server (host:port)
    #[arg(short, long)]
    upstream: Option<String>,

    /// Extra blocklist file, may be repeated
    #[arg(long = "blocklist")]
    blocklists: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let overrides = CliOverrides {
        port: args.port,
        bind: args.bind,
        upstream: args.upstream,
        blocklists: args.blocklists,
        log_level: args.log_level,
    };
    let config = Config::load(args.config.as_deref(), overrides)
        .context("Failed to load configuration")?;

    init_logging(&config.logging.level);

    tokio::select! {
        result = proxy::run(config) => result.context("DNS proxy stopped")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
