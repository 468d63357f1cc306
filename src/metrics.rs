//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener on `METRICS_PORT`.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `log_relay_messages_published_total` - Records handed to the broker (label: status)
//! - `log_relay_messages_consumed_total` - Deliveries by outcome (label: outcome)
//! - `log_relay_claim_errors_total` - Claim attempts that failed against the store
//! - `log_relay_broker_reconnects_total` - Broker reconnection attempts
//!
//! ## Histograms
//! - `log_relay_publish_duration_seconds` - Time until the broker acknowledged a record
//! - `log_relay_action_duration_seconds` - Downstream action duration
//!
//! ## Gauges
//! - `log_relay_broker_connection_status` - 1 = connected, 0 = disconnected

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const MESSAGES_PUBLISHED_TOTAL: &str = "log_relay_messages_published_total";
    pub const MESSAGES_CONSUMED_TOTAL: &str = "log_relay_messages_consumed_total";
    pub const CLAIM_ERRORS_TOTAL: &str = "log_relay_claim_errors_total";
    pub const BROKER_RECONNECTS_TOTAL: &str = "log_relay_broker_reconnects_total";
    pub const PUBLISH_DURATION_SECONDS: &str = "log_relay_publish_duration_seconds";
    pub const ACTION_DURATION_SECONDS: &str = "log_relay_action_duration_seconds";
    pub const BROKER_CONNECTION_STATUS: &str = "log_relay_broker_connection_status";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Fails if the listener cannot be installed, e.g. when a recorder is already set.
pub fn init_metrics(metrics_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::MESSAGES_PUBLISHED_TOTAL,
        "Total number of log records handed to the broker"
    );
    describe_counter!(
        names::MESSAGES_CONSUMED_TOTAL,
        "Total number of deliveries by outcome (first_time, duplicate, malformed, failed)"
    );
    describe_counter!(
        names::CLAIM_ERRORS_TOTAL,
        "Total number of claim attempts that failed against the store"
    );
    describe_counter!(
        names::BROKER_RECONNECTS_TOTAL,
        "Total number of broker reconnection attempts"
    );

    describe_histogram!(
        names::PUBLISH_DURATION_SECONDS,
        "Time until the broker acknowledged a record, in seconds"
    );
    describe_histogram!(
        names::ACTION_DURATION_SECONDS,
        "Downstream action duration in seconds"
    );

    describe_gauge!(
        names::BROKER_CONNECTION_STATUS,
        "Broker connection status (1 = connected, 0 = disconnected)"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Record a publish attempt; `status` is `success` or `failure`.
pub fn record_published(topic: &str, status: &'static str) {
    counter!(names::MESSAGES_PUBLISHED_TOTAL, "topic" => topic.to_string(), "status" => status)
        .increment(1);
}

/// Record the outcome of one delivery.
pub fn record_consumed(outcome: &'static str) {
    counter!(names::MESSAGES_CONSUMED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_claim_error() {
    counter!(names::CLAIM_ERRORS_TOTAL).increment(1);
}

pub fn record_reconnect_attempt() {
    counter!(names::BROKER_RECONNECTS_TOTAL).increment(1);
}

// =============================================================================
// Histograms
// =============================================================================

pub fn record_publish_duration(topic: &str, duration_secs: f64) {
    histogram!(names::PUBLISH_DURATION_SECONDS, "topic" => topic.to_string()).record(duration_secs);
}

pub fn record_action_duration(duration_secs: f64) {
    histogram!(names::ACTION_DURATION_SECONDS).record(duration_secs);
}

// =============================================================================
// Gauges
// =============================================================================

pub fn set_connection_status(connected: bool) {
    gauge!(names::BROKER_CONNECTION_STATUS).set(if connected { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder must be a no-op, not a panic.

    #[test]
    fn test_record_counters() {
        record_published("sys-log-topic", "success");
        record_consumed("duplicate");
        record_claim_error();
        record_reconnect_attempt();
    }

    #[test]
    fn test_record_histograms_and_gauges() {
        record_publish_duration("sys-log-topic", 0.004);
        record_action_duration(0.1);
        set_connection_status(true);
        set_connection_status(false);
    }
}
