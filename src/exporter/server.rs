//! HTTP scrape surface.

use super::SourceRegistry;
use crate::metrics::TEXT_CONTENT_TYPE;
use axum::{
    extract::{MatchedPath, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Errors that can occur while serving scrapes.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the exporter server.
#[derive(Debug, Clone)]
pub struct ExporterServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for ExporterServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 9111).into(),
        }
    }
}

/// Serves every bound scrape path plus an index and a health probe.
pub struct ExporterServer {
    config: ExporterServerConfig,
    registry: Arc<SourceRegistry>,
}

impl ExporterServer {
    pub fn new(config: ExporterServerConfig, registry: SourceRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    /// Runs the server until ctrl-c.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = router(self.registry);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "Exporter listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("Exporter stopped");
        Ok(())
    }
}

/// Builds the router: one GET route per bound path, `/` and `/health`.
pub fn router(registry: Arc<SourceRegistry>) -> Router {
    let mut app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler));
    for path in registry.paths() {
        app = app.route(path, get(scrape_handler));
    }
    app.with_state(registry).layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Handler for every bound scrape path.
async fn scrape_handler(
    State(registry): State<Arc<SourceRegistry>>,
    path: MatchedPath,
) -> Response {
    let Some(report) = registry.scrape(path.as_str()).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match report.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", TEXT_CONTENT_TYPE)],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Handler for `/`, linking every bound path.
async fn index_handler(State(registry): State<Arc<SourceRegistry>>) -> Html<String> {
    let links: String = registry
        .paths()
        .map(|path| format!("<p><a href=\"{path}\">{path}</a></p>\n"))
        .collect();
    Html(format!(
        "<html>\n<head><title>Snapshot Exporter</title></head>\n<body>\n<h1>Snapshot Exporter</h1>\n{links}</body>\n</html>\n"
    ))
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
