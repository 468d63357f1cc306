//! Claim-check stores used for duplicate suppression.
//!
//! A claim is an atomic "set if absent, with expiry" on a key derived from the
//! message id. Whoever creates the key owns the first delivery; everyone else
//! sees a duplicate until the key expires.
//!
//! # Implementations
//!
//! - [`RedisClaimStore`] issues `SET key 1 NX EX <ttl>` through a connection manager
//! - [`InMemoryClaimStore`] keeps claims in a mutex-guarded map, for tests and local runs

mod memory;
mod redis;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

pub use self::memory::InMemoryClaimStore;
pub use self::redis::RedisClaimStore;

/// Value stored under every claim key.
pub const CLAIM_VALUE: &str = "1";

/// Key under which a message id is claimed, e.g. `processed_msg:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimKey(String);

impl ClaimKey {
    pub fn new(prefix: &str, message_id: &str) -> Self {
        Self(format!("{prefix}{message_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Atomic conditional write against a shared key-value store.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Create `key` with a lifetime of `ttl` only if it does not exist.
    ///
    /// Returns `true` when this call created the key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` when the store cannot be reached.
    /// Callers must not treat that as either outcome.
    async fn try_claim(&self, key: &ClaimKey, ttl: Duration) -> AppResult<bool>;

    /// Check that the store answers.
    async fn ping(&self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_key_format() {
        let key = ClaimKey::new("processed_msg:", "4f1c");
        assert_eq!(key.as_str(), "processed_msg:4f1c");
        assert_eq!(key.to_string(), "processed_msg:4f1c");
    }
}
