//! # log_relay
//!
//! Publishes log lines to an Apache Iggy topic and consumes them exactly once
//! per message id, using a Redis claim check for duplicate suppression.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! │        GET /log?msg=…   GET /logs/{id}   /health …          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LogProducer  ──  content|uuid  ──▶  Broker (Iggy)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Listener  ──▶  IdempotentConsumer                          │
//! │                   ├─ ClaimStore: SET processed_msg:<id> NX EX│
//! │                   └─ first time: SysLogRepository.insert    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use log_relay::broker::InMemoryBroker;
//! use log_relay::claim::InMemoryClaimStore;
//! use log_relay::persistence::InMemorySysLogRepository;
//! use log_relay::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::from_env()?);
//!     let state = AppState::new(
//!         config,
//!         Arc::new(InMemoryBroker::new()),
//!         Arc::new(InMemoryClaimStore::new()),
//!         Arc::new(InMemorySysLogRepository::new()),
//!     );
//!     let app = build_router(state.clone());
//!
//!     // Serve `app`, then:
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod claim;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
