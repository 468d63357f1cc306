//! Idempotent consumer for log records.
//!
//! Each delivered record is parsed, then its message id is claimed in the
//! claim store with a single atomic `SET NX EX`. Only the delivery that creates
//! the claim runs the downstream action; every other delivery of the same id
//! within the claim TTL is a duplicate.
//!
//! # Failure Policy
//!
//! - Malformed records are dropped (debug log, counter) and acknowledged
//! - A store outage fails the delivery with `StoreUnavailable`, so the record
//!   is redelivered; it is never treated as first-time or duplicate
//! - When the action fails or times out after a successful claim, the claim
//!   stays in place. Redeliveries within the TTL are duplicates, so the event
//!   is logged at error level and counted as an abandoned claim for replay

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::claim::{ClaimKey, ClaimStore};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{LogMessage, NewSysLog};
use crate::persistence::SysLogRepository;

use super::listener::RecordHandler;

/// Outcome of a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// This delivery claimed the id and the action ran
    FirstTime,
    /// The id was already claimed; nothing ran
    Duplicate,
    /// The record could not be parsed and was dropped
    Malformed,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::FirstTime => "first_time",
            Delivery::Duplicate => "duplicate",
            Delivery::Malformed => "malformed",
        }
    }
}

/// Business action run once per message id.
#[async_trait]
pub trait DownstreamAction: Send + Sync {
    async fn execute(&self, message: &LogMessage) -> AppResult<()>;
}

/// Stores each first-time log line as a `SysLog` record.
pub struct PersistLogAction {
    repository: Arc<dyn SysLogRepository>,
}

impl PersistLogAction {
    pub fn new(repository: Arc<dyn SysLogRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl DownstreamAction for PersistLogAction {
    async fn execute(&self, message: &LogMessage) -> AppResult<()> {
        let record = NewSysLog::new(message.message_id(), message.content());
        let id = self.repository.insert(record).await?;
        info!(id, message_id = %message.message_id(), content = %message.content(), "Log record stored");
        Ok(())
    }
}

/// Claim settings for [`IdempotentConsumer`].
#[derive(Debug, Clone)]
pub struct ClaimSettings {
    pub key_prefix: String,
    pub claim_ttl: Duration,
    pub action_timeout: Duration,
}

impl ClaimSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            key_prefix: config.claim_key_prefix.clone(),
            claim_ttl: config.claim_ttl,
            action_timeout: config.action_timeout,
        }
    }
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Delivery counters, `Ordering::Relaxed` throughout.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    first_time: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
    abandoned_claims: AtomicU64,
    claim_errors: AtomicU64,
}

impl ConsumerStats {
    pub fn first_time(&self) -> u64 {
        self.first_time.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn abandoned_claims(&self) -> u64 {
        self.abandoned_claims.load(Ordering::Relaxed)
    }

    pub fn claim_errors(&self) -> u64 {
        self.claim_errors.load(Ordering::Relaxed)
    }
}

/// Runs a downstream action at most once per message id and claim TTL.
#[derive(Clone)]
pub struct IdempotentConsumer {
    store: Arc<dyn ClaimStore>,
    action: Arc<dyn DownstreamAction>,
    settings: ClaimSettings,
    stats: Arc<ConsumerStats>,
}

impl IdempotentConsumer {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        action: Arc<dyn DownstreamAction>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            store,
            action,
            settings,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Handle one delivered record.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable` if the claim could not be attempted
    /// - `ActionFailed` or `OperationTimeout` if the action did not complete;
    ///   the claim is kept
    ///
    /// The record must not be acknowledged on error.
    #[instrument(skip_all, fields(size = raw.len()))]
    pub async fn on_message(&self, raw: &str) -> AppResult<Delivery> {
        let message = match raw.parse::<LogMessage>() {
            Ok(message) => message,
            Err(e) => return Ok(self.discard(&e.to_string())),
        };

        let key = ClaimKey::new(&self.settings.key_prefix, message.message_id());
        let claimed = match self.store.try_claim(&key, self.settings.claim_ttl).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(claim_key = %key, error = %e, "Claim attempt failed, record will be redelivered");
                self.stats.claim_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_claim_error();
                metrics::record_consumed("failed");
                return Err(e);
            }
        };

        if !claimed {
            info!(message_id = %message.message_id(), "Duplicate delivery skipped");
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            metrics::record_consumed(Delivery::Duplicate.as_str());
            return Ok(Delivery::Duplicate);
        }

        let started = Instant::now();
        let result = tokio::time::timeout(self.settings.action_timeout, self.action.execute(&message)).await;
        metrics::record_action_duration(started.elapsed().as_secs_f64());

        let failure = match result {
            Ok(Ok(())) => {
                debug!(message_id = %message.message_id(), "First delivery processed");
                self.stats.first_time.fetch_add(1, Ordering::Relaxed);
                metrics::record_consumed(Delivery::FirstTime.as_str());
                return Ok(Delivery::FirstTime);
            }
            Ok(Err(AppError::ActionFailed(msg))) => AppError::ActionFailed(msg),
            Ok(Err(e)) => AppError::ActionFailed(e.to_string()),
            Err(_) => AppError::OperationTimeout(format!(
                "downstream action exceeded {:?}",
                self.settings.action_timeout
            )),
        };

        error!(
            message_id = %message.message_id(),
            claim_key = %key,
            claim_ttl_secs = self.settings.claim_ttl.as_secs(),
            error = %failure,
            "Downstream action did not complete; claim stands until it expires"
        );
        self.stats.abandoned_claims.fetch_add(1, Ordering::Relaxed);
        metrics::record_consumed("failed");
        Err(failure)
    }

    /// Handle one delivered record as raw bytes.
    ///
    /// Payloads that are not valid UTF-8 are malformed. They are never
    /// repaired, so two distinct byte sequences can never share a claim key.
    pub async fn on_payload(&self, raw: &[u8]) -> AppResult<Delivery> {
        match std::str::from_utf8(raw) {
            Ok(text) => self.on_message(text).await,
            Err(e) => Ok(self.discard(&format!("payload is not valid UTF-8: {e}"))),
        }
    }

    fn discard(&self, reason: &str) -> Delivery {
        debug!(reason, "Discarding malformed record");
        self.stats.malformed.fetch_add(1, Ordering::Relaxed);
        metrics::record_consumed(Delivery::Malformed.as_str());
        Delivery::Malformed
    }
}

#[async_trait]
impl RecordHandler for IdempotentConsumer {
    async fn handle(&self, payload: &[u8]) -> AppResult<()> {
        self.on_payload(payload).await.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::claim::InMemoryClaimStore;
    use crate::persistence::InMemorySysLogRepository;
    use std::sync::atomic::AtomicUsize;

    struct CountingAction {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingAction {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DownstreamAction for CountingAction {
        async fn execute(&self, _message: &LogMessage) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AppError::Repository("insert failed".to_string()));
            }
            Ok(())
        }
    }

    fn consumer(store: &InMemoryClaimStore, action: Arc<CountingAction>) -> IdempotentConsumer {
        let settings = ClaimSettings {
            key_prefix: "processed_msg:".to_string(),
            claim_ttl: Duration::from_secs(600),
            action_timeout: Duration::from_millis(100),
        };
        IdempotentConsumer::new(Arc::new(store.clone()), action, settings)
    }

    #[tokio::test]
    async fn test_first_delivery_then_duplicate() {
        let store = InMemoryClaimStore::new();
        let action = Arc::new(CountingAction::new());
        let consumer = consumer(&store, action.clone());

        assert_eq!(consumer.on_message("UserLogin|id-1").await.unwrap(), Delivery::FirstTime);
        assert_eq!(consumer.on_message("UserLogin|id-1").await.unwrap(), Delivery::Duplicate);

        assert_eq!(action.calls(), 1);
        assert_eq!(consumer.stats().first_time(), 1);
        assert_eq!(consumer.stats().duplicates(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_dropped_without_claim() {
        let store = InMemoryClaimStore::new();
        let action = Arc::new(CountingAction::new());
        let consumer = consumer(&store, action.clone());

        assert_eq!(consumer.on_message("justcontent").await.unwrap(), Delivery::Malformed);
        assert_eq!(consumer.on_message("content|").await.unwrap(), Delivery::Malformed);

        assert_eq!(action.calls(), 0);
        assert!(store.is_empty().await);
        assert_eq!(consumer.stats().malformed(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_ids_are_not_merged() {
        let store = InMemoryClaimStore::new();
        let action = Arc::new(CountingAction::new());
        let consumer = consumer(&store, action.clone());

        assert_eq!(consumer.on_payload(b"abc|id\xff").await.unwrap(), Delivery::Malformed);
        assert_eq!(consumer.on_payload(b"abc|id\xfe").await.unwrap(), Delivery::Malformed);

        assert_eq!(action.calls(), 0);
        assert!(store.is_empty().await);
        assert_eq!(consumer.stats().malformed(), 2);
        assert_eq!(consumer.stats().duplicates(), 0);
    }

    #[tokio::test]
    async fn test_valid_utf8_payload_is_processed() {
        let store = InMemoryClaimStore::new();
        let action = Arc::new(CountingAction::new());
        let consumer = consumer(&store, action.clone());

        assert_eq!(
            consumer.on_payload("Übung|id-1".as_bytes()).await.unwrap(),
            Delivery::FirstTime
        );
        assert_eq!(action.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let store = InMemoryClaimStore::new();
        store.set_available(false);
        let action = Arc::new(CountingAction::new());
        let consumer = consumer(&store, action.clone());

        let err = consumer.on_message("UserLogin|id-1").await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert_eq!(action.calls(), 0);
        assert_eq!(consumer.stats().claim_errors(), 1);
    }

    #[tokio::test]
    async fn test_action_failure_keeps_claim() {
        let store = InMemoryClaimStore::new();
        let action = Arc::new(CountingAction {
            fail: true,
            ..CountingAction::new()
        });
        let consumer = consumer(&store, action.clone());

        let err = consumer.on_message("UserLogin|id-1").await.unwrap_err();
        assert!(matches!(err, AppError::ActionFailed(_)));

        assert_eq!(consumer.on_message("UserLogin|id-1").await.unwrap(), Delivery::Duplicate);
        assert_eq!(action.calls(), 1);
        assert_eq!(consumer.stats().abandoned_claims(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_action_times_out() {
        let store = InMemoryClaimStore::new();
        let action = Arc::new(CountingAction {
            delay: Duration::from_secs(1),
            ..CountingAction::new()
        });
        let consumer = consumer(&store, action);

        let err = consumer.on_message("UserLogin|id-1").await.unwrap_err();
        assert!(matches!(err, AppError::OperationTimeout(_)));
        assert_eq!(consumer.stats().abandoned_claims(), 1);
    }

    #[tokio::test]
    async fn test_persist_action_stores_record() {
        let repository = InMemorySysLogRepository::new();
        let action = PersistLogAction::new(Arc::new(repository.clone()));

        let message = LogMessage::with_id("a|b", "id-7").unwrap();
        action.execute(&message).await.unwrap();

        let stored = repository.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.msg_id, "id-7");
        assert_eq!(stored.content, "a|b");
    }
}
