// HTTP request handlers for server mode
//
// Reading ingestion and health check endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde_json::json;
use tracing::{debug, warn};
use weatherpair_core::InboundReading;

use crate::{AppError, AppState};

/// POST /request/ - sensor reading ingestion
///
/// Responds once the reading is either paired and written, or parked waiting
/// for its partner. Persistence failures are not reported to the device.
pub(crate) async fn ingest_reading(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    debug!("Received reading ({} bytes)", body.len());

    let max_payload = state.max_payload_bytes;
    if body.len() > max_payload {
        counter!("weatherpair.requests.payload_too_large").increment(1);
        return Err(AppError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            anyhow::anyhow!("payload {} exceeds limit {}", body.len(), max_payload),
        ));
    }

    let reading: InboundReading = serde_json::from_slice(&body).map_err(|e| {
        counter!("weatherpair.requests", "outcome" => "malformed").increment(1);
        AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::Error::new(e).context("Invalid reading payload"),
        )
    })?;

    let outcome = state.resolver.handle_report(reading).await.map_err(|e| {
        counter!("weatherpair.requests", "outcome" => "invalid_device").increment(1);
        AppError::with_status(StatusCode::BAD_REQUEST, e.into())
    })?;

    counter!("weatherpair.requests", "outcome" => outcome.as_str()).increment(1);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": outcome.as_str(),
            "slot": outcome.slot().as_str(),
        })),
    )
        .into_response())
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - Readiness check (includes storage connectivity)
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.resolver.pending_len();
    match state.resolver.sink().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "ready", "storage": "connected", "pending": pending})),
        ),
        Err(e) => {
            warn!("Storage readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "storage": "disconnected",
                    "pending": pending,
                    "error": e.to_string(),
                })),
            )
        }
    }
}
