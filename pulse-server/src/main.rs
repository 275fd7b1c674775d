use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pulse_server::{run, shutdown_signal, Cli, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from(Cli::parse());
    run(config, shutdown_signal())
        .await
        .context("pulse server terminated with an error")
}
