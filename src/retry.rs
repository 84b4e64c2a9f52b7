//! Retry budget and backoff for failed attempts.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    GiveUp,
    /// Resubmit to the pool, waiting this long before relaunching the engine.
    RetryAfter(Duration),
}

/// `max_retries` counts resubmissions, so a job gets at most `max_retries + 1` attempts.
///
/// With a zero `base_delay` failed jobs are resubmitted immediately; otherwise
/// the delay doubles per attempt up to `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// `attempts` is the number of attempts made so far, including the one that just failed.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts > self.max_retries {
            return RetryDecision::GiveUp;
        }

        let exp = 1u32 << attempts.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}
