//! voicebridge: answer the phone, put the assistant on the line.

mod app;
mod config;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "voicebridge", version, about = "SIP voice assistant bridge for home automation")]
struct Cli {
    /// Check configuration and exit without registering.
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error). Overrides
    /// LOG_LEVEL and RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(cli.log_level.as_deref().or(config.log_level.as_deref()));

    if cli.dry_run {
        println!("{}", config.summary());
        println!("\nConfiguration OK. Run without --dry-run to start the bridge.");
        return Ok(());
    }

    app::run(config).await
}
