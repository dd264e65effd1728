mod audit;
mod cli;
mod commands;
mod config;
mod errors;
mod extraction;
mod join;
mod llm_client;
mod models;
mod state;
mod stats;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Bad configuration is the one failure that stops before any work starts
    let config = Config::from_env()?;

    // Logs go to stderr; stdout carries the report tables
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "cvbias v{} (judge: {:?}, concurrency: {})",
        env!("CARGO_PKG_VERSION"),
        config.judge,
        config.concurrency
    );

    if let Err(err) = commands::run(cli.command, config).await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
    Ok(())
}
