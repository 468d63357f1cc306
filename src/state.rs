//! Shared application state for Axum handlers.
//!
//! - **Services**: Log producer and idempotent consumer
//! - **Backends**: Broker, claim store and repository handles behind trait objects
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! Background tasks (the listener and the broker health check) are managed
//! with `tokio_util::task::TaskTracker` and `CancellationToken`. Call
//! `shutdown()` to stop them before application exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::broker::Broker;
use crate::claim::ClaimStore;
use crate::config::Config;
use crate::persistence::SysLogRepository;
use crate::services::{
    ClaimSettings, IdempotentConsumer, Listener, ListenerSettings, LogProducer, PersistLogAction,
    PublishSettings,
};

/// Shared application state for Axum handlers.
///
/// Cloned for each request; everything inside is behind `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, broker, claim_store, repository);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    pub producer: LogProducer,
    pub consumer: IdempotentConsumer,
    pub broker: Arc<dyn Broker>,
    pub claim_store: Arc<dyn ClaimStore>,
    pub repository: Arc<dyn SysLogRepository>,
    pub config: Arc<Config>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Wire the services together and start the background tasks.
    ///
    /// The listener subscribes the idempotent consumer to the configured topic.
    pub fn new(
        config: Arc<Config>,
        broker: Arc<dyn Broker>,
        claim_store: Arc<dyn ClaimStore>,
        repository: Arc<dyn SysLogRepository>,
    ) -> Self {
        let producer = LogProducer::new(
            broker.clone(),
            config.topic.as_str(),
            PublishSettings::from_config(&config),
        );
        let consumer = IdempotentConsumer::new(
            claim_store.clone(),
            Arc::new(PersistLogAction::new(repository.clone())),
            ClaimSettings::from_config(&config),
        );

        let state = Self {
            producer,
            consumer,
            broker,
            claim_store,
            repository,
            config,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_listener();
        state.spawn_health_check_task();

        state
    }

    fn spawn_listener(&self) {
        Listener::new(self.broker.clone(), ListenerSettings::from_config(&self.config))
            .subscribe(self.config.topic.clone(), Arc::new(self.consumer.clone()))
            .spawn(&self.task_tracker, self.cancellation_token.clone());
    }

    /// Periodically probe the broker so a dead connection is noticed before
    /// the next publish hits it.
    fn spawn_health_check_task(&self) {
        let broker = self.broker.clone();
        let interval_duration = self.config.health_check_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Health check task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if broker.health_check().await {
                            trace!("Health check: broker connection OK");
                        } else {
                            warn!("Health check: broker connection is down");
                        }
                    }
                }
            }

            debug!("Health check task shutting down");
        });
    }

    /// Stop background tasks and wait for pending publishes.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        self.producer.drain().await;

        info!("All background tasks have completed");
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
