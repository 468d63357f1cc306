use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ClaimKey, ClaimStore};
use crate::config::MAX_CLAIM_TTL;
use crate::error::{AppError, AppResult};

/// Expired entries are swept once the map grows past this size.
const PURGE_THRESHOLD: usize = 10_000;

/// In-process claim store with per-key expiry.
///
/// Check and insert happen under one lock, so concurrent claims of the same
/// key are atomic. Uses `tokio::time::Instant`, which follows paused test time.
#[derive(Clone, Default)]
pub struct InMemoryClaimStore {
    claims: Arc<Mutex<HashMap<String, Instant>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every call fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Drop every claim, as if all of them had expired.
    pub async fn clear(&self) {
        self.claims.lock().await.clear();
    }

    /// Number of unexpired claims.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.claims
            .lock()
            .await
            .values()
            .filter(|expires_at| **expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AppError::StoreUnavailable(
                "in-memory claim store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn try_claim(&self, key: &ClaimKey, ttl: Duration) -> AppResult<bool> {
        self.check_available()?;

        let now = Instant::now();
        let mut claims = self.claims.lock().await;

        if claims.len() >= PURGE_THRESHOLD {
            claims.retain(|_, expires_at| *expires_at > now);
        }

        match claims.get(key.as_str()) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                claims.insert(key.as_str().to_string(), now + ttl.min(MAX_CLAIM_TTL));
                Ok(true)
            }
        }
    }

    async fn ping(&self) -> AppResult<()> {
        self.check_available()
    }
}
