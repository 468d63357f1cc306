//! Subscription loop feeding broker records to handlers.
//!
//! Each subscription polls its topic, runs the handler for every record of the
//! batch on a bounded set of tasks, and then commits the offset of the last
//! record in the contiguous run of successes at the start of the batch. The
//! first failed record and everything after it come back on the next poll.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::{Broker, Record, exponential_backoff};
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Processes the raw payload of one record. `Ok` acknowledges it.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub batch_size: u32,
    /// Pause after an empty poll
    pub poll_interval: Duration,
    /// Records of one batch handled concurrently
    pub workers: usize,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl ListenerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.poll_batch_size,
            poll_interval: config.poll_interval,
            workers: config.consumer_workers,
            retry_base_delay: config.reconnect_base_delay,
            retry_max_delay: config.reconnect_max_delay,
        }
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of processing one polled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub polled: usize,
    pub succeeded: usize,
    /// Offset committed after the batch, if any
    pub committed: Option<u64>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.polled
    }
}

struct Subscription {
    topic: String,
    handler: Arc<dyn RecordHandler>,
}

/// Polls subscribed topics and dispatches records to their handlers.
///
/// ```rust,ignore
/// let listener = Listener::new(broker, ListenerSettings::from_config(&config))
///     .subscribe(&config.topic, Arc::new(consumer));
/// listener.spawn(&tracker, cancel.clone());
/// ```
pub struct Listener {
    broker: Arc<dyn Broker>,
    settings: ListenerSettings,
    subscriptions: Vec<Subscription>,
}

impl Listener {
    pub fn new(broker: Arc<dyn Broker>, settings: ListenerSettings) -> Self {
        Self {
            broker,
            settings,
            subscriptions: Vec::new(),
        }
    }

    /// Register `handler` for every record published to `topic`.
    pub fn subscribe(mut self, topic: impl Into<String>, handler: Arc<dyn RecordHandler>) -> Self {
        self.subscriptions.push(Subscription {
            topic: topic.into(),
            handler,
        });
        self
    }

    /// Poll every subscription once and process what came back.
    ///
    /// Returns one outcome per subscription, in subscription order.
    pub async fn poll_once(&self) -> AppResult<Vec<BatchOutcome>> {
        let mut outcomes = Vec::with_capacity(self.subscriptions.len());
        for subscription in &self.subscriptions {
            outcomes.push(process_batch(&self.broker, &self.settings, subscription).await?);
        }
        Ok(outcomes)
    }

    /// Run one polling task per subscription until `cancel` fires.
    ///
    /// A batch in progress is finished before the task stops.
    pub fn spawn(self, tracker: &TaskTracker, cancel: CancellationToken) {
        let settings = Arc::new(self.settings);

        for subscription in self.subscriptions {
            let broker = self.broker.clone();
            let settings = settings.clone();
            let cancel = cancel.clone();

            tracker.spawn(async move {
                info!(topic = %subscription.topic, "Listener started");
                run_subscription(broker, settings, subscription, cancel).await;
            });
        }
    }
}

async fn run_subscription(
    broker: Arc<dyn Broker>,
    settings: Arc<ListenerSettings>,
    subscription: Subscription,
    cancel: CancellationToken,
) {
    let mut consecutive_failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let delay = match process_batch(&broker, &settings, &subscription).await {
            Ok(outcome) if outcome.polled == 0 => {
                consecutive_failures = 0;
                settings.poll_interval
            }
            Ok(outcome) if outcome.is_complete() => {
                consecutive_failures = 0;
                Duration::ZERO
            }
            Ok(outcome) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let delay = exponential_backoff(
                    settings.retry_base_delay,
                    settings.retry_max_delay,
                    consecutive_failures,
                );
                warn!(
                    topic = %subscription.topic,
                    polled = outcome.polled,
                    succeeded = outcome.succeeded,
                    delay_ms = delay.as_millis() as u64,
                    "Batch partially failed, unacknowledged records will be redelivered"
                );
                delay
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let delay = exponential_backoff(
                    settings.retry_base_delay,
                    settings.retry_max_delay,
                    consecutive_failures,
                );
                warn!(
                    topic = %subscription.topic,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Polling failed, retrying"
                );
                delay
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    debug!(topic = %subscription.topic, "Listener shutting down");
}

#[instrument(skip_all, fields(topic = %subscription.topic))]
async fn process_batch(
    broker: &Arc<dyn Broker>,
    settings: &ListenerSettings,
    subscription: &Subscription,
) -> AppResult<BatchOutcome> {
    let records = broker.poll(&subscription.topic, settings.batch_size).await?;
    if records.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let results = dispatch(records.as_slice(), subscription, settings.workers).await?;

    let prefix = results.iter().take_while(|ok| **ok).count();
    let committed = match prefix.checked_sub(1).and_then(|last| records.get(last)) {
        Some(record) => {
            broker.commit(&subscription.topic, record.offset).await?;
            Some(record.offset)
        }
        None => None,
    };

    let outcome = BatchOutcome {
        polled: records.len(),
        succeeded: results.iter().filter(|ok| **ok).count(),
        committed,
    };
    debug!(
        polled = outcome.polled,
        succeeded = outcome.succeeded,
        committed = ?outcome.committed,
        "Batch processed"
    );
    Ok(outcome)
}

/// Handle every record, at most `workers` at a time. Slot `i` is `true` when
/// record `i` was acknowledged; a panicking handler leaves its slot `false`.
async fn dispatch(
    records: &[Record],
    subscription: &Subscription,
    workers: usize,
) -> AppResult<Vec<bool>> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for (index, record) in records.iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("worker semaphore closed: {e}")))?;
        let handler = subscription.handler.clone();
        let payload = record.payload.clone();
        let offset = record.offset;

        tasks.spawn(async move {
            let _permit = permit;
            let result = handler.handle(&payload).await;
            (index, offset, result)
        });
    }

    let mut results = vec![false; records.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, _, Ok(()))) => {
                if let Some(slot) = results.get_mut(index) {
                    *slot = true;
                }
            }
            Ok((_, offset, Err(e))) => {
                warn!(offset, error = %e, "Record not acknowledged");
            }
            Err(e) => {
                error!(error = %e, "Record handler task panicked");
            }
        }
    }

    Ok(results)
}
