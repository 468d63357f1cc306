use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query string of `GET /log`.
#[derive(Debug, Deserialize)]
pub struct PublishQuery {
    /// Log content to publish
    pub msg: String,
}

/// Response after a log line has been handed to the broker.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Id attached to the published record
    pub message_id: String,
    /// Content as published
    pub content: String,
    /// Stream the record was sent to
    pub stream: String,
    /// Topic the record was sent to
    pub topic: String,
    /// Time the request was accepted
    pub timestamp: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Whether the broker connection is healthy
    pub broker_connected: bool,
    /// Whether the claim store answered a ping
    pub claim_store_reachable: bool,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Statistics response.
///
/// Counters are process-local and reset on restart.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Records handed to the broker
    pub messages_published: u64,
    /// Records the broker refused
    pub publish_failures: u64,
    /// Deliveries that ran the downstream action
    pub first_time: u64,
    /// Deliveries suppressed by the claim check
    pub duplicates: u64,
    /// Records discarded as unparseable
    pub malformed: u64,
    /// Claims whose action failed or timed out
    pub abandoned_claims: u64,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_query_deserialization() {
        let query: PublishQuery =
            serde_json::from_str(r#"{"msg": "UserLogin"}"#).expect("Deserialization should succeed");
        assert_eq!(query.msg, "UserLogin");
    }

    #[test]
    fn test_publish_response_serialization() {
        let response = PublishResponse {
            message_id: "id-1".to_string(),
            content: "UserLogin".to_string(),
            stream: "sys-log-stream".to_string(),
            topic: "sys-log-topic".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"message_id\":\"id-1\""));
        assert!(json.contains("\"topic\":\"sys-log-topic\""));
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "degraded".to_string(),
            broker_connected: true,
            claim_store_reachable: false,
            version: "0.1.0".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&response).expect("Serialization should succeed");
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("\"claim_store_reachable\":false"));
    }
}
