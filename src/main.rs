//! Oyaki entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use oyaki::config::load_config;
use oyaki::http::HttpServer;
use oyaki::lifecycle::{spawn_signal_listener, Shutdown};
use oyaki::observability::{init_logging, init_metrics};

/// Image-transcoding reverse proxy.
#[derive(Debug, Parser)]
#[command(name = "oyaki", version, about)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // Logging is not up yet, so configuration problems go straight to stderr.
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("oyaki: {e}");
            std::process::exit(2);
        }
    };

    init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting oyaki");
    tracing::info!(
        origin = %config.origin.base_url(),
        quality = %config.conversion.quality,
        webp_encoder = ?config.conversion.webp.encoder,
        bind_address = %config.listener.bind_address,
        "Configuration loaded"
    );

    // Metrics server
    if let Some(metrics_address) = &config.observability.metrics_address {
        match metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
