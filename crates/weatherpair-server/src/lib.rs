// Server mode - HTTP ingestion for the two-sensor synchronizer
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - SQLite or in-memory row storage
// - Structured logging with tracing
// - Graceful shutdown that flushes waiting readings

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use weatherpair_config::RuntimeConfig;
use weatherpair_sync::PairingResolver;

mod handlers;
mod init;

use handlers::{health_check, ingest_reading, ready_check};
pub use init::{init_resolver, init_sink, init_tracing};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<PairingResolver>,
    pub max_payload_bytes: usize,
}

impl AppState {
    pub fn new(resolver: Arc<PairingResolver>, max_payload_bytes: usize) -> Self {
        Self {
            resolver,
            max_payload_bytes,
        }
    }
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request error: {:?}", self.error);
        } else {
            warn!(status = self.status.as_u16(), "Rejected request: {:#}", self.error);
        }
        (
            self.status,
            Json(json!({
                "error": format!("{:#}", self.error),
            })),
        )
            .into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

/// Build the HTTP router.
///
/// Both `/request` and `/request/` accept readings; existing firmware posts to
/// the trailing-slash form.
pub fn build_router(state: AppState) -> Router {
    // Leave headroom above the configured limit so oversized bodies reach the
    // handler and get a JSON 413 instead of axum's plain-text one.
    let body_limit = state.max_payload_bytes.saturating_mul(2).max(1024);

    Router::new()
        .route("/request", post(ingest_reading))
        .route("/request/", post(ingest_reading))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    info!(
        backend = %config.storage.backend,
        pair_window_secs = config.sync.pair_window_secs,
        utc_offset_minutes = config.sync.utc_offset_minutes,
        first = %config.devices.first,
        second = %config.devices.second,
        "Starting weatherpair"
    );

    let sink = init_sink(&config)?;
    let resolver = Arc::new(init_resolver(&config, sink)?);
    let state = AppState::new(Arc::clone(&resolver), config.request.max_payload_bytes);
    let app = build_router(state);

    let addr = &config.server.listen_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/request/ - Sensor reading ingestion", addr);
    info!("  GET  http://{}/health   - Health check", addr);
    info!("  GET  http://{}/ready    - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_resolver(&resolver).await;
    Ok(())
}

/// Commit waiting reports, wait for in-flight writes, then close the sink.
///
/// Runs after the listener has stopped, so no new reports can arrive.
pub async fn shutdown_resolver(resolver: &PairingResolver) -> usize {
    let flushed = resolver.flush_pending().await;
    if let Err(e) = resolver.sink().close().await {
        warn!(error = %e, "Failed to close row sink cleanly");
    }
    info!(flushed, "Server shutdown complete");
    flushed
}
