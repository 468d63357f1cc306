//! Health, readiness, and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check with broker and claim store status
//! - `GET /ready` - Readiness probe
//! - `GET /stats` - Publish and delivery counters
//!
//! # Health vs Readiness
//!
//! - **Health** (`/health`): Returns 200 even if degraded, includes details
//! - **Readiness** (`/ready`): Returns 503 unless the broker is connected and
//!   the claim store answers; without the store no record can be processed

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::{instrument, warn};

use crate::models::{HealthResponse, StatsResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "broker_connected": true,
///   "claim_store_reachable": true,
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let broker_connected = state.broker.is_connected();
    let claim_store_reachable = state.claim_store.ping().await.is_ok();

    Json(HealthResponse {
        status: if broker_connected && claim_store_reachable {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        broker_connected,
        claim_store_reachable,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if !state.broker.is_connected() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    if let Err(e) = state.claim_store.ping().await {
        warn!(error = %e, "Readiness check: claim store unreachable");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(StatusCode::OK)
}

/// Statistics endpoint.
///
/// Counters are kept in process memory and start at zero on every restart.
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let producer = state.producer.stats();
    let consumer = state.consumer.stats();

    Json(StatsResponse {
        messages_published: producer.published(),
        publish_failures: producer.failures(),
        first_time: consumer.first_time(),
        duplicates: consumer.duplicates(),
        malformed: consumer.malformed(),
        abandoned_claims: consumer.abandoned_claims(),
        uptime_seconds: state.uptime_seconds(),
    })
}
