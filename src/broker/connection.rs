//! Connection state shared between broker operations and the health checker.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard};

/// Connection state tracking for reconnection coordination.
///
/// Reconnection is serialized by an async mutex. Each successful reconnect
/// bumps a generation counter; a task that queued behind another reconnect
/// compares generations and skips its own attempt when the link was already
/// replaced while it waited.
pub struct ConnectionState {
    connected: AtomicBool,
    /// Consecutive failed reconnection attempts
    reconnect_attempts: AtomicU32,
    generation: AtomicU64,
    reconnect_gate: Mutex<()>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            reconnect_gate: Mutex::new(()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        if connected {
            self.reconnect_attempts.store(0, Ordering::SeqCst);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Record another reconnection attempt, returning its 1-based number.
    pub fn increment_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Wait for the right to reconnect.
    ///
    /// Returns `None` if another task completed a reconnect after
    /// `observed_generation` was read, meaning the caller can simply retry.
    pub async fn acquire_reconnect(&self, observed_generation: u64) -> Option<MutexGuard<'_, ()>> {
        let guard = self.reconnect_gate.lock().await;
        if self.generation() != observed_generation && self.is_connected() {
            return None;
        }
        Some(guard)
    }

    /// Mark a completed reconnect. Call while holding the reconnect guard.
    pub fn mark_reconnected(&self) {
        self.set_connected(true);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_connection_state_initial() {
        let state = ConnectionState::new();

        assert!(!state.is_connected());
        assert_eq!(state.attempts(), 0);
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn test_attempts_reset_on_connect() {
        let state = ConnectionState::new();

        assert_eq!(state.increment_attempts(), 1);
        assert_eq!(state.increment_attempts(), 2);

        state.set_connected(true);
        assert_eq!(state.attempts(), 0);
    }

    #[tokio::test]
    async fn test_acquire_reconnect_when_nobody_reconnected() {
        let state = ConnectionState::new();
        let observed = state.generation();

        assert!(state.acquire_reconnect(observed).await.is_some());
    }

    #[tokio::test]
    async fn test_waiter_skips_after_other_reconnect() {
        let state = Arc::new(ConnectionState::new());
        let observed = state.generation();

        let guard = state.acquire_reconnect(observed).await.unwrap();

        let waiter_state = state.clone();
        let waiter =
            tokio::spawn(async move { waiter_state.acquire_reconnect(observed).await.is_some() });

        tokio::time::sleep(Duration::from_millis(10)).await;
        state.mark_reconnected();
        drop(guard);

        let acquired = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter timed out")
            .expect("waiter panicked");
        assert!(!acquired, "waiter should reuse the fresh connection");
        assert_eq!(state.generation(), 1);
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn test_waiter_reconnects_after_failed_reconnect() {
        let state = Arc::new(ConnectionState::new());
        let observed = state.generation();

        let guard = state.acquire_reconnect(observed).await.unwrap();
        let waiter_state = state.clone();
        let waiter =
            tokio::spawn(async move { waiter_state.acquire_reconnect(observed).await.is_some() });

        // First reconnect gives up without bumping the generation
        drop(guard);

        let acquired = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter timed out")
            .expect("waiter panicked");
        assert!(acquired);
    }
}
