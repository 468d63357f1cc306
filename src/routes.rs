//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────────┐
//! │  Set Request ID      │ ← Generates X-Request-Id when absent
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │     Tracing          │ ← HTTP request/response logging
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │  Propagate Request ID│ ← Copies X-Request-Id onto the response
//! └──────────┬───────────┘
//!            │
//!            ▼
//!         Handler
//! ```
//!
//! # Routes
//!
//! - `/` - Status page
//! - `/log`, `/logs/{id}` - Publish and look up log records
//! - `/health`, `/ready`, `/stats` - Health & monitoring

use axum::Router;
use axum::http::{HeaderName, Request};
use axum::routing::get;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::handlers;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .unwrap_or("-");

        info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        .route("/", get(handlers::home))
        .route("/log", get(handlers::publish_log))
        .route("/logs/{id}", get(handlers::get_log))
        // Health and status endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/stats", get(handlers::stats))
        // Layers run bottom to top on the way in
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(trace_layer)
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}
