//! AR.IO Gateway node binary.
//!
//! Main entry point for the gateway's data-retrieval and chunk-reconstruction
//! service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::config::Config;
use gateway_core::log::initialize_logging;
use gateway_core::{create_app, Error, GatewayCore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "AR.IO Gateway node", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Override server host
    #[arg(long)]
    host: Option<String>,

    /// Override server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override trusted Arweave node URL
    #[arg(long)]
    trusted_node_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    initialize_logging(config.log.format);

    info!("Starting AR.IO gateway");
    info!("Server will run on {}:{}", config.host, config.port);

    let core = Arc::new(GatewayCore::new(config.clone()));
    core.start();

    let app = create_app(core.clone());
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .context("Failed to bind TCP listener")?;

    info!("Server listening on http://{}:{}", config.host, config.port);

    let result = axum::serve(listener, app).await.context("Server error");
    core.stop();
    result
}

fn load_config() -> Result<Config> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => Config::from_file(&path)
            .map_err(map_config_error)
            .with_context(|| format!("Failed to read config file: {}", path))?,
        None => {
            tracing::debug!("No config file specified, using defaults");
            Config::default()
        }
    };

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(trusted_node_url) = args.trusted_node_url {
        config.trusted_node.url = trusted_node_url;
    }

    Ok(config)
}

fn map_config_error(err: Error) -> anyhow::Error {
    anyhow::anyhow!(err.to_string())
}
