//! Retry Policy and Exponential Backoff
//!
//! Classifies dispatch failures into retryable and terminal and computes the
//! delay before each retry: `delay = min(base * multiplier^attempt, cap)`.

use crate::shared::config::DispatchConfig;
use crate::shared::error::SyncError;
use std::time::Duration;

/// Retry policy applied to every dispatched mutation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    multiplier: f64,
    cap: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Build a policy from dispatcher configuration
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            base: config.backoff_base,
            multiplier: config.backoff_multiplier,
            cap: config.backoff_cap,
            max_retries: config.max_retries,
        }
    }

    /// Delay before the retry with the given zero-based index
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let millis = (self.base.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.cap)
    }

    /// Whether a further attempt is allowed after `attempt` retries
    pub fn should_retry(&self, error: &SyncError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Configured retry cap
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(1000));
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(2), Duration::from_millis(4000));
        assert_eq!(policy.delay(3), Duration::from_millis(8000));
        // capped
        assert_eq!(policy.delay(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_retry_allowance() {
        let policy = RetryPolicy::default();
        let server = SyncError::Server { status: 500 };
        let client = SyncError::Client {
            status: 400,
            message: String::new(),
        };

        assert!(policy.should_retry(&server, 0));
        assert!(policy.should_retry(&server, 2));
        assert!(!policy.should_retry(&server, 3));
        assert!(!policy.should_retry(&client, 0));
        assert!(policy.should_retry(&SyncError::Timeout, 0));
        assert!(policy.should_retry(&SyncError::network("refused"), 0));
    }
}
