use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Connection Errors
///
/// Broker connectivity errors are split into specific variants so the
/// reconnection logic can pattern match on them:
///
/// - `ConnectionFailed` - Initial connection or reconnection failed
/// - `Disconnected` - Lost connection during operation (triggers reconnection)
/// - `ConnectionReset` - Connection was reset by peer (triggers reconnection)
///
/// # Message Processing Errors
///
/// `StoreUnavailable`, `ActionFailed` and `OperationTimeout` returned from the
/// consumer mean the record must not be acknowledged; the listener leaves the
/// offset uncommitted so the broker redelivers it.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to connect to message broker: {0}")]
    ConnectionFailed(String),

    #[error("Disconnected from message broker: {0}")]
    Disconnected(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Stream operation failed: {0}")]
    StreamError(String),

    #[error("Topic operation failed: {0}")]
    TopicError(String),

    #[error("Failed to send message: {0}")]
    SendError(String),

    #[error("Failed to poll messages: {0}")]
    PollError(String),

    #[error("Failed to commit consumer offset: {0}")]
    CommitError(String),

    #[error("Claim store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Downstream action failed: {0}")]
    ActionFailed(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Invalid wire record: {0}")]
    InvalidRecord(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation timed out: {0}")]
    OperationTimeout(String),
}

impl AppError {
    /// Whether the error points at an unreachable dependency rather than bad input.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionFailed(_)
                | AppError::Disconnected(_)
                | AppError::ConnectionReset(_)
                | AppError::StoreUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Repository(e.to_string())
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Full detail stays in the server log, clients get a sanitized message
        tracing::error!(error = %self, "Request failed");

        let (status, error_type, message) = match &self {
            AppError::ConnectionFailed(_)
            | AppError::Disconnected(_)
            | AppError::ConnectionReset(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "broker_unavailable",
                "Message broker is temporarily unavailable. Please try again later.",
            ),
            AppError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "Deduplication store is temporarily unavailable. Please try again later.",
            ),
            AppError::StreamError(_) | AppError::TopicError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "broker_error",
                "Broker operation failed. Please contact support if the issue persists.",
            ),
            AppError::SendError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "send_error",
                "Failed to publish message. Please try again.",
            ),
            AppError::PollError(_) | AppError::CommitError(_) | AppError::ActionFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "consume_error",
                "Message consumption failed. Please try again.",
            ),
            AppError::Repository(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "repository_error",
                "Failed to access stored logs. Please try again.",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists.",
            ),
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "Service configuration error. Please contact support.",
            ),
            AppError::OperationTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "Operation timed out. Please try again.",
            ),

            // Client errors carry user-facing messages
            AppError::InvalidRecord(msg) => (StatusCode::BAD_REQUEST, "invalid_record", msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_maps_to_503() {
        let response = AppError::StoreUnavailable("redis down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            AppError::BadRequest("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let response = AppError::OperationTimeout("slow".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_is_unavailable() {
        assert!(AppError::StoreUnavailable("x".to_string()).is_unavailable());
        assert!(AppError::Disconnected("x".to_string()).is_unavailable());
        assert!(!AppError::ActionFailed("x".to_string()).is_unavailable());
        assert!(!AppError::BadRequest("x".to_string()).is_unavailable());
    }
}
