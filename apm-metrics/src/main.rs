//! APM metrics HTTP server binary entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use apm_metrics::MetricsApm;
use apm_metrics::server::{ApmServer, CliArgs, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    let server_config = ServerConfig::from(&args);

    let settings = args.settings_map().unwrap_or_else(|e| {
        tracing::error!("Failed to load settings: {}", e);
        std::process::exit(1);
    });

    let apm = Arc::new(MetricsApm::default());
    if settings.is_empty() {
        tracing::info!("No settings provided, waiting for PUT /api/v1/config");
    } else if let Err(e) = apm.configure(&settings).await {
        tracing::error!("Failed to apply settings: {}", e);
        std::process::exit(1);
    }

    let server = ApmServer::new(apm, server_config);
    if let Err(e) = server.run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
