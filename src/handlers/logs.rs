//! Log publishing and lookup endpoints.
//!
//! # Endpoints
//!
//! - `GET /` - Status page
//! - `GET /log?msg=<text>` - Publish a log line
//! - `GET /logs/{id}` - Fetch a stored log record

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use chrono::Utc;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::models::{PublishQuery, PublishResponse, SysLog};
use crate::state::AppState;

const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>log_relay</title></head>
<body>
<h1>log_relay ready</h1>
<p>Publish a log line: <a href="/log?msg=TestLog">/log?msg=TestLog</a></p>
<p>Stored records: <code>/logs/{id}</code> &middot; Status: <a href="/health">/health</a>, <a href="/stats">/stats</a></p>
</body>
</html>
"#;

#[instrument]
pub async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

/// Publish `msg` to the log topic.
///
/// Returns 202 as soon as the record is handed off; broker delivery happens in
/// the background.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:3000/log?msg=UserLogin"
/// ```
///
/// ```json
/// {
///   "message_id": "1c0f6a52-...",
///   "content": "UserLogin",
///   "stream": "sys-log-stream",
///   "topic": "sys-log-topic",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state, query), fields(size = query.msg.len()))]
pub async fn publish_log(
    State(state): State<AppState>,
    Query(query): Query<PublishQuery>,
) -> AppResult<(StatusCode, Json<PublishResponse>)> {
    let message_id = state.producer.publish(&query.msg)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            message_id,
            content: query.msg,
            stream: state.config.stream.clone(),
            topic: state.producer.topic().to_string(),
            timestamp: Utc::now(),
        }),
    ))
}

/// Fetch a stored log record by id.
#[instrument(skip(state))]
pub async fn get_log(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<SysLog>> {
    state
        .repository
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Log record {id} not found")))
}
