use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::broker::{Broker, exponential_backoff};
use crate::config::Config;
use crate::error::AppResult;
use crate::metrics;
use crate::models::LogMessage;
use crate::validation::validate_content;

/// Retry and validation settings for [`LogProducer`].
#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Retries after the first attempt, confirmed publishing only
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub max_content_length: usize,
}

impl PublishSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.publish_max_retries,
            retry_base_delay: config.publish_retry_base_delay,
            retry_max_delay: config.reconnect_max_delay,
            max_content_length: config.max_content_length,
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Publish counters.
///
/// Counters use `Ordering::Relaxed`; they feed `/stats` only and nothing
/// synchronizes on them.
#[derive(Debug, Default)]
pub struct ProducerStats {
    published: AtomicU64,
    failures: AtomicU64,
}

impl ProducerStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Publishes log lines as `content|uuid` records to a fixed topic.
#[derive(Clone)]
pub struct LogProducer {
    broker: Arc<dyn Broker>,
    topic: Arc<str>,
    settings: PublishSettings,
    /// Tracks fire-and-forget sends so shutdown can wait for them
    tracker: TaskTracker,
    stats: Arc<ProducerStats>,
}

impl LogProducer {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<Arc<str>>, settings: PublishSettings) -> Self {
        Self {
            broker,
            topic: topic.into(),
            settings,
            tracker: TaskTracker::new(),
            stats: Arc::new(ProducerStats::default()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    /// Validate `content`, attach a fresh id and hand the record to the broker
    /// in the background.
    ///
    /// Returns the id right away. Delivery failures are logged and counted,
    /// never reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if the content exceeds the size limit.
    #[instrument(skip(self, content), fields(topic = %self.topic, size = content.len()))]
    pub fn publish(&self, content: &str) -> AppResult<String> {
        validate_content(content, self.settings.max_content_length)?;

        let message = LogMessage::new(content);
        let message_id = message.message_id().to_string();
        let payload = message.encode();

        let broker = self.broker.clone();
        let topic = self.topic.clone();
        let stats = self.stats.clone();
        let span = info_span!("publish_send", message_id = %message_id);

        self.tracker.spawn(
            async move {
                let started = Instant::now();
                match broker.send(&topic, payload).await {
                    Ok(()) => {
                        stats.published.fetch_add(1, Ordering::Relaxed);
                        metrics::record_published(&topic, "success");
                        metrics::record_publish_duration(&topic, started.elapsed().as_secs_f64());
                        debug!("Record delivered to broker");
                    }
                    Err(e) => {
                        stats.failures.fetch_add(1, Ordering::Relaxed);
                        metrics::record_published(&topic, "failure");
                        warn!(error = %e, "Failed to deliver record to broker");
                    }
                }
            }
            .instrument(span),
        );

        Ok(message_id)
    }

    /// Publish and wait for the broker to acknowledge, retrying with
    /// exponential backoff. Every attempt reuses the same id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for oversized content, otherwise the error
    /// of the last failed attempt.
    #[instrument(skip(self, content), fields(topic = %self.topic, size = content.len()))]
    pub async fn publish_confirmed(&self, content: &str) -> AppResult<String> {
        validate_content(content, self.settings.max_content_length)?;

        let message = LogMessage::new(content);
        let payload = message.encode();
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.broker.send(&self.topic, payload.clone()).await {
                Ok(()) => {
                    self.stats.published.fetch_add(1, Ordering::Relaxed);
                    metrics::record_published(&self.topic, "success");
                    metrics::record_publish_duration(&self.topic, started.elapsed().as_secs_f64());
                    info!(message_id = %message.message_id(), attempt, "Record acknowledged by broker");
                    return Ok(message.message_id().to_string());
                }
                Err(e) if attempt < self.settings.max_retries => {
                    attempt += 1;
                    let delay = exponential_backoff(
                        self.settings.retry_base_delay,
                        self.settings.retry_max_delay,
                        attempt,
                    );
                    warn!(
                        message_id = %message.message_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    metrics::record_published(&self.topic, "failure");
                    warn!(message_id = %message.message_id(), error = %e, "Publish failed, giving up");
                    return Err(e);
                }
            }
        }
    }

    /// Wait until every background send has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::error::AppError;

    const TOPIC: &str = "sys-log-topic";

    fn producer(broker: &InMemoryBroker) -> LogProducer {
        let settings = PublishSettings {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(50),
            max_content_length: 64,
        };
        LogProducer::new(Arc::new(broker.clone()), TOPIC, settings)
    }

    #[tokio::test]
    async fn test_publish_sends_content_with_id() {
        let broker = InMemoryBroker::new();
        let producer = producer(&broker);

        let id = producer.publish("UserLogin").unwrap();
        producer.drain().await;

        let records = broker.records(TOPIC).await;
        assert_eq!(records, vec![format!("UserLogin|{id}").into_bytes()]);
        assert_eq!(producer.stats().published(), 1);
    }

    #[tokio::test]
    async fn test_publish_hides_broker_failure() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);
        let producer = producer(&broker);

        assert!(producer.publish("UserLogin").is_ok());
        producer.drain().await;

        assert_eq!(producer.stats().failures(), 1);
        assert_eq!(producer.stats().published(), 0);
    }

    #[tokio::test]
    async fn test_publish_rejects_oversized_content() {
        let broker = InMemoryBroker::new();
        let producer = producer(&broker);

        assert!(matches!(producer.publish(&"x".repeat(65)), Err(AppError::BadRequest(_))));
        producer.drain().await;
        assert!(broker.records(TOPIC).await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_can_be_called_repeatedly() {
        let broker = InMemoryBroker::new();
        let producer = producer(&broker);

        producer.publish("first").unwrap();
        producer.drain().await;
        producer.publish("second").unwrap();
        producer.drain().await;

        assert_eq!(broker.records(TOPIC).await.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_confirmed_gives_up_after_retries() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);
        let producer = producer(&broker);

        let err = producer.publish_confirmed("UserLogin").await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(producer.stats().failures(), 1);
    }

    #[tokio::test]
    async fn test_publish_confirmed_succeeds() {
        let broker = InMemoryBroker::new();
        let producer = producer(&broker);

        let id = producer.publish_confirmed("UserLogin").await.unwrap();
        assert_eq!(broker.records(TOPIC).await, vec![format!("UserLogin|{id}").into_bytes()]);
    }
}
