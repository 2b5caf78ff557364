//! Capped exponential backoff.
//!
//! Formula: `min(base_delay * 2^attempt, cap_delay)`. The reconnection
//! policy passes the 1-based attempt number, so the first retry of an outage
//! waits `2 * base_delay`.

use std::time::Duration;

/// Delay in milliseconds for exponent `attempt`.
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, cap_delay_ms: u64) -> u64 {
    // 2^31 already saturates any realistic base delay
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    exponential.min(cap_delay_ms)
}

/// [`calculate_backoff_delay`] as a [`Duration`].
pub fn backoff_duration(attempt: u32, base_delay_ms: u64, cap_delay_ms: u64) -> Duration {
    Duration::from_millis(calculate_backoff_delay(attempt, base_delay_ms, cap_delay_ms))
}
