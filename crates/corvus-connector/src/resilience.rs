//! Resilience configuration for connection handling.
//!
//! Retry policy with exponential backoff, consumed by the harvest runner
//! when a chunk fetch fails with a transient connection error.

use std::time::Duration;

/// Retry policy for reconnect attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries for connection failures.
    pub max_retries: u32,
    /// Initial retry delay.
    pub initial_delay: Duration,
    /// Maximum retry delay cap.
    pub max_delay: Duration,
    /// Backoff multiplier (exponential factor).
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = initial * multiplier^attempt,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if a retry should be attempted.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}
