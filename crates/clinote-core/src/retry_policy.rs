//! Retry policy object, parameterized by `max_attempts`, `base_delay`, and
//! `cap`. Components describe retryable errors via the shared error
//! taxonomy; this object owns only the timing.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            cap,
        }
    }

    /// Extraction-job attempt backoff: `min(30s, 2^attempt seconds)`.
    pub fn extraction_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::from_secs(1), Duration::from_secs(30))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the given 1-based attempt number, capped at `self.cap`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(30));
        self.base_delay.saturating_mul(factor).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_backoff_caps_at_30_seconds() {
        let policy = RetryPolicy::extraction_attempts(3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::extraction_attempts(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
