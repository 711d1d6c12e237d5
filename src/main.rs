//! Snapshot Exporter CLI
//!
//! Polls the configured cluster endpoints on every scrape and serves the
//! translated metrics over HTTP.

use clap::Parser;
use snapshot_exporter::{
    config::{CliArgs, ExporterConfig},
    exporter::ExporterServer,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Snapshot Exporter v{}", snapshot_exporter::VERSION);

    let config = match ExporterConfig::load(CliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let registry = match config.build_registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to set up collectors: {}", e);
            std::process::exit(1);
        }
    };

    for path in registry.paths() {
        info!("Exposing metrics on {}{}", config.listen_addr, path);
    }

    let server = ExporterServer::new(config.server_config(), registry);
    if let Err(e) = server.run().await {
        error!("Exporter failed: {}", e);
        std::process::exit(1);
    }
}
