use std::time::Duration;

use crate::error::{ErrorKind, StoreError};

/// Outcome of a retry decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another attempt should be made.
    pub retry: bool,
    /// Backoff delay to observe before the next attempt.
    pub delay: Duration,
}

impl RetryDecision {
    pub fn give_up() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Bounded exponential backoff policy keyed on error kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    retryable_kinds: Vec<ErrorKind>,
}

impl RetryPolicy {
    /// Policy retrying network failures up to `max_retries` times.
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: 30_000,
            retryable_kinds: vec![ErrorKind::Network],
        }
    }

    /// Cap the computed backoff delay.
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Replace the allow-list of retryable error kinds.
    pub fn with_retryable_kinds(mut self, kinds: impl Into<Vec<ErrorKind>>) -> Self {
        self.retryable_kinds = kinds.into();
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide whether to re-attempt after failure number `attempt` (0-based).
    ///
    /// Retries iff the attempt budget is not exhausted and the error kind is
    /// allow-listed. Cancellation is never retried regardless of allow-list.
    pub fn decide(&self, attempt: u32, error: &StoreError) -> RetryDecision {
        if error.kind == ErrorKind::Cancelled
            || attempt >= self.max_retries
            || !self.retryable_kinds.contains(&error.kind)
        {
            return RetryDecision::give_up();
        }

        RetryDecision {
            retry: true,
            delay: self.delay_for_attempt(attempt, error.retry_after_ms),
        }
    }

    /// Exponential delay for the given attempt, bounded by the policy cap and
    /// raised to the server's retry-after hint when that is larger.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        let hinted = retry_after_hint_ms.unwrap_or(0);
        let bounded = calculated.max(hinted).min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 500)
    }
}
