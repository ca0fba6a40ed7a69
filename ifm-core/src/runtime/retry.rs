use std::time::Duration;

/// Bounded retry policy applied to every attempt of an activity.
///
/// Delays grow geometrically from `initial_interval` by
/// `backoff_coefficient`, capped at `maximum_interval`.  A
/// `maximum_attempts` of `0` retries without limit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
}

impl RetryPolicy {
    /// Retry up to `maximum_attempts` times without waiting between attempts.
    pub fn immediate(maximum_attempts: u32) -> Self {
        Self {
            initial_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            maximum_interval: Duration::ZERO,
            maximum_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.maximum_attempts == 0 || attempt < self.maximum_attempts
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let delay = self.initial_interval.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.maximum_interval.as_secs_f64() {
            self.maximum_interval
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 5,
        }
    }
}

/// Per-activity execution options.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    /// Upper bound for a single attempt.
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn new(start_to_close_timeout: Duration) -> Self {
        Self {
            start_to_close_timeout,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_backs_off_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(8));
        assert_eq!(policy.delay_after(30), Duration::from_secs(100));
    }

    #[test]
    fn attempt_ceiling_is_respected() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(4));
        assert!(!policy.allows_retry(5));
        assert!(RetryPolicy::immediate(0).allows_retry(1_000));
    }
}
