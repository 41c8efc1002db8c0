//! Retry policy: backoff for an unavailable store.

use std::time::Duration;

/// Retry policy for store calls failing with `StoreError::Unavailable`.
///
/// delay = base_delay * multiplier^(attempt - 1), capped at max_delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Zero behaves like one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after `attempt` failed attempts (1-indexed).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        if !delay_secs.is_finite() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs).min(self.max_delay)
    }
}
