//! Apache Iggy implementation of [`Broker`].
//!
//! # Connection Resilience
//!
//! - Every operation is bounded by `OPERATION_TIMEOUT_SECS`
//! - Connection errors trigger a reconnect with exponential backoff and
//!   jitter, followed by one retry of the operation
//! - A timeout only triggers a reconnect when the connection is already
//!   known to be down; a slow broker is not a broken one
//!
//! # Offsets
//!
//! Polling uses `PollingStrategy::next()` without auto-commit. The listener
//! stores the consumer offset explicitly once records are processed, so the
//! next poll resumes right after the last committed record.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use iggy::prelude::*;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::backoff::exponential_backoff;
use super::connection::ConnectionState;
use super::{Broker, Record};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Convert a string to an Identifier, returning an appropriate error on failure.
pub fn to_identifier(name: &str, resource_type: &str) -> AppResult<Identifier> {
    name.try_into().map_err(|e: IggyError| {
        debug!(
            resource_type,
            name,
            original_error = %e,
            "Identifier conversion failed"
        );
        AppError::BadRequest(format!(
            "Invalid {resource_type} name '{name}': must be 1-255 characters, alphanumeric \
             with dots, underscores, or hyphens, starting and ending with alphanumeric"
        ))
    })
}

/// Iggy client with reconnection, bound to one stream, partition and consumer.
///
/// Cloning is cheap; clones share the underlying client.
#[derive(Clone)]
pub struct IggyBroker {
    /// Swapped out wholesale on reconnect
    client: Arc<RwLock<IggyClient>>,
    config: Arc<Config>,
    state: Arc<ConnectionState>,
}

impl IggyBroker {
    /// Connect to the Iggy server described by `config`.
    ///
    /// No retry happens here; startup fails fast if the server is unreachable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionFailed` if the connection string is invalid,
    /// the server is unreachable, or authentication fails.
    #[instrument(skip(config), fields(connection_string = %config.iggy_connection_string))]
    pub async fn connect(config: Arc<Config>) -> AppResult<Self> {
        info!("Initializing Iggy client");

        let client = IggyClient::from_connection_string(&config.iggy_connection_string)
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;

        client
            .connect()
            .await
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;

        let broker = Self {
            client: Arc::new(RwLock::new(client)),
            config,
            state: Arc::new(ConnectionState::new()),
        };
        broker.state.set_connected(true);
        metrics::set_connection_status(true);
        info!("Successfully connected to Iggy server");

        Ok(broker)
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Replace the client with a freshly connected one, unless another task
    /// already did so after `observed` was read.
    #[instrument(skip(self))]
    async fn reconnect(&self, observed: u64) -> AppResult<()> {
        let Some(_guard) = self.state.acquire_reconnect(observed).await else {
            debug!("Reconnection by another task succeeded");
            return Ok(());
        };

        self.state.set_connected(false);
        metrics::set_connection_status(false);
        let max_attempts = self.config.max_reconnect_attempts;

        loop {
            let attempt = self.state.increment_attempts();

            // 0 = infinite
            if max_attempts > 0 && attempt > max_attempts {
                error!(
                    attempts = attempt - 1,
                    max_attempts, "Maximum reconnection attempts exceeded"
                );
                return Err(AppError::ConnectionFailed(format!(
                    "Failed to reconnect after {max_attempts} attempts"
                )));
            }

            let delay = exponential_backoff(
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
                attempt,
            );
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Attempting to reconnect to Iggy server"
            );
            metrics::record_reconnect_attempt();
            sleep(delay).await;

            let new_client =
                match IggyClient::from_connection_string(&self.config.iggy_connection_string) {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(attempt, error = %e, "Failed to create new client");
                        continue;
                    }
                };

            if let Err(e) = new_client.connect().await {
                warn!(attempt, error = %e, "Reconnection attempt failed");
                continue;
            }

            *self.client.write().await = new_client;
            self.state.mark_reconnected();
            metrics::set_connection_status(true);
            info!(attempt, "Successfully reconnected to Iggy server");
            return Ok(());
        }
    }

    /// Run `operation` bounded by the operation timeout, reconnecting and
    /// retrying once when the connection turns out to be broken.
    async fn with_reconnect<F, Fut, T>(&self, operation: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        let timeout = self.config.operation_timeout;
        let generation = self.state.generation();

        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if Self::is_connection_error(&e) => {
                warn!(error = %e, "Operation failed due to connection error, attempting reconnect");
            }
            Ok(Err(e)) => return Err(e),
            Err(_) if !self.state.is_connected() => {
                warn!(
                    ?timeout,
                    "Operation timed out and connection state is disconnected, attempting reconnect"
                );
            }
            Err(_) => {
                debug!(?timeout, "Operation timed out but connection state is healthy");
                return Err(AppError::OperationTimeout(format!(
                    "Broker operation timed out after {timeout:?}"
                )));
            }
        }

        self.reconnect(generation).await?;

        tokio::time::timeout(timeout, operation())
            .await
            .map_err(|_| {
                AppError::OperationTimeout(format!(
                    "Broker operation timed out after {timeout:?} on retry"
                ))
            })?
    }

    fn is_connection_error(error: &AppError) -> bool {
        matches!(
            error,
            AppError::ConnectionFailed(_) | AppError::Disconnected(_) | AppError::ConnectionReset(_)
        )
    }

    /// Map an SDK error, keeping connectivity failures distinguishable.
    fn map_iggy_error(e: IggyError, fallback: fn(String) -> AppError) -> AppError {
        match e {
            IggyError::Disconnected | IggyError::NotConnected => {
                AppError::Disconnected(e.to_string())
            }
            IggyError::CannotEstablishConnection => AppError::ConnectionFailed(e.to_string()),
            other => fallback(other.to_string()),
        }
    }

    // =========================================================================
    // Stream & Topic Initialization
    // =========================================================================

    /// Ensure the stream exists, creating it if necessary.
    #[instrument(skip(self))]
    pub async fn ensure_stream(&self, name: &str) -> AppResult<()> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;
            let stream_id = to_identifier(name, "stream")?;

            match client.get_stream(&stream_id).await {
                Ok(Some(_)) => {
                    debug!(stream = name, "Stream already exists");
                    Ok(())
                }
                Ok(None) | Err(_) => {
                    info!(stream = name, "Creating stream");
                    client
                        .create_stream(name)
                        .await
                        .map_err(|e| Self::map_iggy_error(e, AppError::StreamError))?;
                    Ok(())
                }
            }
        })
        .await
    }

    /// Ensure the topic exists within the stream, creating it if necessary.
    #[instrument(skip(self))]
    pub async fn ensure_topic(&self, stream: &str, topic: &str) -> AppResult<()> {
        let partitions = self.config.topic_partitions;
        let replication_factor = self.config.topic_replication_factor;

        self.with_reconnect(|| async {
            let client = self.client.read().await;
            let stream_id = to_identifier(stream, "stream")?;
            let topic_id = to_identifier(topic, "topic")?;

            match client.get_topic(&stream_id, &topic_id).await {
                Ok(Some(_)) => {
                    debug!(stream, topic, "Topic already exists");
                    Ok(())
                }
                Ok(None) | Err(_) => {
                    info!(stream, topic, partitions, replication_factor, "Creating topic");
                    client
                        .create_topic(
                            &stream_id,
                            topic,
                            partitions,
                            Default::default(),
                            Some(replication_factor),
                            IggyExpiry::NeverExpire,
                            MaxTopicSize::Unlimited,
                        )
                        .await
                        .map_err(|e| Self::map_iggy_error(e, AppError::TopicError))?;
                    Ok(())
                }
            }
        })
        .await
    }

    /// Provision the configured stream and topic.
    #[instrument(skip(self))]
    pub async fn initialize_defaults(&self) -> AppResult<()> {
        self.ensure_stream(&self.config.stream).await?;
        self.ensure_topic(&self.config.stream, &self.config.topic)
            .await
    }

    fn consumer(&self) -> AppResult<Consumer> {
        let consumer_id = self.config.consumer_id;
        let id = Identifier::numeric(consumer_id)
            .map_err(|_| AppError::ConfigError(format!("Invalid consumer ID: {consumer_id}")))?;
        Ok(Consumer::new(id))
    }
}

#[async_trait]
impl Broker for IggyBroker {
    #[instrument(skip(self, payload), fields(stream = %self.config.stream, size = payload.len()))]
    async fn send(&self, topic: &str, payload: String) -> AppResult<()> {
        let partition_id = self.config.partition_id;

        self.with_reconnect(|| async {
            let client = self.client.read().await;

            let stream_id = to_identifier(&self.config.stream, "stream")?;
            let topic_id = to_identifier(topic, "topic")?;
            let message =
                IggyMessage::from_str(&payload).map_err(|e| AppError::SendError(e.to_string()))?;

            let mut messages = vec![message];
            client
                .send_messages(
                    &stream_id,
                    &topic_id,
                    &Partitioning::partition_id(partition_id),
                    &mut messages,
                )
                .await
                .map_err(|e| Self::map_iggy_error(e, AppError::SendError))?;

            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(stream = %self.config.stream))]
    async fn poll(&self, topic: &str, max: u32) -> AppResult<Vec<Record>> {
        let partition_id = self.config.partition_id;

        let polled = self
            .with_reconnect(|| async {
                let client = self.client.read().await;

                let stream_id = to_identifier(&self.config.stream, "stream")?;
                let topic_id = to_identifier(topic, "topic")?;
                let consumer = self.consumer()?;

                client
                    .poll_messages(
                        &stream_id,
                        &topic_id,
                        Some(partition_id),
                        &consumer,
                        &PollingStrategy::next(),
                        max,
                        false,
                    )
                    .await
                    .map_err(|e| Self::map_iggy_error(e, AppError::PollError))
            })
            .await?;

        let records = polled
            .messages
            .into_iter()
            .map(|message| Record {
                offset: message.header.offset,
                payload: message.payload.to_vec(),
            })
            .collect::<Vec<_>>();

        debug!(count = records.len(), topic, "Messages polled");
        Ok(records)
    }

    #[instrument(skip(self), fields(stream = %self.config.stream))]
    async fn commit(&self, topic: &str, offset: u64) -> AppResult<()> {
        let partition_id = self.config.partition_id;

        self.with_reconnect(|| async {
            let client = self.client.read().await;

            let stream_id = to_identifier(&self.config.stream, "stream")?;
            let topic_id = to_identifier(topic, "topic")?;
            let consumer = self.consumer()?;

            client
                .store_consumer_offset(&consumer, &stream_id, &topic_id, Some(partition_id), offset)
                .await
                .map_err(|e| Self::map_iggy_error(e, AppError::CommitError))
        })
        .await
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn health_check(&self) -> bool {
        let client = self.client.read().await;
        let healthy = tokio::time::timeout(self.config.operation_timeout, client.ping())
            .await
            .is_ok_and(|result| result.is_ok());
        drop(client);

        // Only flip to disconnected here; reconnecting is left to the next operation
        if !healthy && self.state.is_connected() {
            self.state.set_connected(false);
            metrics::set_connection_status(false);
        }
        healthy
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_identifier_valid_names() {
        assert!(to_identifier("sys-log-stream", "stream").is_ok());
        assert!(to_identifier("sys_log.v2", "topic").is_ok());
    }

    #[test]
    fn test_to_identifier_invalid_names() {
        let err = to_identifier("", "stream").unwrap_err();
        assert!(err.to_string().contains("Invalid stream name"));
        assert!(to_identifier(&"a".repeat(300), "topic").is_err());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(IggyBroker::is_connection_error(&AppError::ConnectionFailed(
            "x".to_string()
        )));
        assert!(IggyBroker::is_connection_error(&AppError::Disconnected(
            "x".to_string()
        )));
        assert!(IggyBroker::is_connection_error(&AppError::ConnectionReset(
            "x".to_string()
        )));

        for error in [
            AppError::SendError("x".to_string()),
            AppError::PollError("x".to_string()),
            AppError::CommitError("x".to_string()),
            AppError::OperationTimeout("x".to_string()),
            AppError::StoreUnavailable("x".to_string()),
        ] {
            assert!(
                !IggyBroker::is_connection_error(&error),
                "{error:?} should not trigger reconnection"
            );
        }
    }

    #[test]
    fn test_map_iggy_error_keeps_disconnects() {
        let err = IggyBroker::map_iggy_error(IggyError::Disconnected, AppError::SendError);
        assert!(matches!(err, AppError::Disconnected(_)));

        let err = IggyBroker::map_iggy_error(IggyError::Error, AppError::SendError);
        assert!(matches!(err, AppError::SendError(_)));
    }
}
