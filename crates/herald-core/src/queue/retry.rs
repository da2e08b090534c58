//! Retry policy: decides backoff delays and when to give up.

use std::time::Duration;

/// Retry policy for transient publish failures.
///
/// `attempts` is the number of consecutive failed attempts so far, counting
/// the one that just failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay unit; the first retry waits `base_delay * 2`.
    pub base_delay: Duration,

    /// Cap on any single delay.
    pub max_delay: Duration,

    /// Total attempts (first try included) before an item is marked failed.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(600),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from explicit values (see `HeraldConfig::retry_policy`).
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before the next attempt.
    ///
    /// # Arguments
    /// * `attempts` - Consecutive failed attempts, counting the one that just
    ///   failed.
    ///
    /// # Returns
    /// `min(base_delay * 2^attempts, max_delay)`. Overflow saturates at
    /// `max_delay`.
    ///
    /// Example with base_delay=2s:
    /// - attempts 1: 4s
    /// - attempts 2: 8s
    /// - attempts 3: 16s
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Whether another attempt is allowed after `attempts` failures.
    ///
    /// Both the publisher (transient failures) and the reconciler (an
    /// ambiguous call the remote side never received) consult this, so
    /// `max_attempts` bounds the total number of publish calls per schedule.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
