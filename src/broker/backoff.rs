//! Retry delay computation shared by reconnection and confirmed publishing.

use std::time::Duration;

/// Jitter applied to every computed delay (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

/// Delays never drop below this, whatever the jitter.
const MIN_DELAY_MS: u64 = 10;

/// Generate a random jitter value between 0.0 and 1.0.
pub fn rand_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random::<f64>()
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max`, then jittered by ±20%.
pub fn exponential_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;

    let delay_ms = base_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
        .min(max_ms);

    let jitter = (delay_ms as f64 * BACKOFF_JITTER_PERCENT * (rand_jitter() * 2.0 - 1.0)) as i64;
    let final_ms = (delay_ms as i64 + jitter).max(MIN_DELAY_MS as i64) as u64;

    Duration::from_millis(final_ms)
}
