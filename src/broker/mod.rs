//! Message broker abstraction.
//!
//! The producer and the listener only talk to [`Broker`]; the concrete client is
//! chosen at startup.
//!
//! # Implementations
//!
//! - [`IggyBroker`] - Apache Iggy client with reconnection and operation timeouts
//! - [`InMemoryBroker`] - per-topic append-only logs, for tests and local demos
//!
//! # Delivery Model
//!
//! Records are read from the last committed offset onwards. A record is only
//! skipped by later polls once an offset at or beyond it has been committed, so
//! anything left uncommitted is delivered again.

mod backoff;
mod connection;
mod iggy;
mod memory;

use async_trait::async_trait;

use crate::error::AppResult;

pub use self::backoff::{exponential_backoff, rand_jitter};
pub use self::connection::ConnectionState;
pub use self::iggy::{IggyBroker, to_identifier};
pub use self::memory::InMemoryBroker;

/// A record read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position of the record within its partition
    pub offset: u64,
    /// Payload bytes exactly as stored by the broker; not necessarily UTF-8
    pub payload: Vec<u8>,
}

/// Minimal broker contract used by the producer and the listener.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append a payload to `topic`. Returns once the broker acknowledged it.
    async fn send(&self, topic: &str, payload: String) -> AppResult<()>;

    /// Fetch up to `max` records following the last committed offset.
    async fn poll(&self, topic: &str, max: u32) -> AppResult<Vec<Record>>;

    /// Mark every record up to and including `offset` as processed.
    async fn commit(&self, topic: &str, offset: u64) -> AppResult<()>;

    /// Last known connection state.
    fn is_connected(&self) -> bool;

    /// Live connectivity probe. Defaults to the last known state.
    async fn health_check(&self) -> bool {
        self.is_connected()
    }
}
