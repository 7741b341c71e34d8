//! precache command-line host.
//!
//! Drives one worker version through its lifecycle against the configured
//! origin. Logs go to stderr so command output on stdout stays clean.

use anyhow::Result;
use clap::Parser;
use precache_core::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }

    let config = AppConfig::load_from(cli.config_file.as_deref())?;

    tracing::debug!(cache = %config.cache_name, origin = %config.origin, "loaded configuration");

    commands::run(cli.command, &config).await
}
