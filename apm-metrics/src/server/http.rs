//! HTTP server for the metrics cache.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, put};
use tokio::signal;

use super::config::ServerConfig;
use super::handlers::{
    AppState, handle_evaluate, handle_get_config, handle_healthy, handle_info, handle_metrics,
    handle_put_config, handle_query, handle_query_multiple, handle_ready,
};
use super::middleware::track_requests;
use crate::apm::MetricsApm;

/// HTTP server exposing the query surface of a [`MetricsApm`].
pub struct ApmServer {
    apm: Arc<MetricsApm>,
    config: ServerConfig,
}

impl ApmServer {
    pub fn new(apm: Arc<MetricsApm>, config: ServerConfig) -> Self {
        Self { apm, config }
    }

    /// Run the HTTP server until SIGINT or SIGTERM, then stop polling.
    pub async fn run(self) -> std::io::Result<()> {
        let app = router(self.apm.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!("Starting APM metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.apm.stop().await;
        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Builds the router with all routes and the request metrics middleware.
pub fn router(apm: Arc<MetricsApm>) -> Router {
    let metrics = apm.metrics().clone();
    let state = AppState { apm };

    Router::new()
        .route("/api/v1/query", get(handle_query))
        .route("/api/v1/query_multiple", get(handle_query_multiple))
        .route(
            "/api/v1/evaluate",
            get(handle_evaluate).post(handle_evaluate),
        )
        .route(
            "/api/v1/config",
            put(handle_put_config).get(handle_get_config),
        )
        .route("/api/v1/info", get(handle_info))
        .route("/metrics", get(handle_metrics))
        .route("/-/healthy", get(handle_healthy))
        .route("/-/ready", get(handle_ready))
        .layer(from_fn_with_state(metrics, track_requests))
        .with_state(state)
}

/// Listen for SIGTERM (K8s pod termination) and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
