use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::fetch::Outcome;
use crate::scheduler::WorkItem;

/// Largest exponent applied to the base delay (2^16 × base is far past any sane cap).
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after the given delay; the next attempt uses a new identity.
    Retry(Duration),
    /// Stop; the item becomes terminally failed.
    GiveUp,
}

/// Exponential backoff with caps and additive jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff; also the jitter bound.
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Duration,
    /// Add uniform jitter in `[0, base_delay)` to every delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
            jitter: true,
        }
    }

    /// Decide what happens to `item` after its latest attempt ended in `outcome`.
    ///
    /// `item.attempts()` counts attempts already made (1 after the first).
    /// Success never needs a retry; fatal failures and exhausted items give up.
    pub fn decide(&self, item: &WorkItem, outcome: &Outcome) -> RetryDecision {
        match outcome {
            Outcome::Success | Outcome::Fatal(_) => RetryDecision::GiveUp,
            Outcome::Retryable(_) if item.attempts() >= self.max_attempts => RetryDecision::GiveUp,
            Outcome::Retryable(_) => RetryDecision::Retry(self.delay_after(item.attempts())),
        }
    }

    /// Deterministic part of the delay after `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    ///
    /// The exponent is `attempt - 1`, so the first retry waits exactly
    /// `base_delay`. Jitter is added on top of the capped value by
    /// [`RetryPolicy::delay_after`].
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Backoff plus jitter, so items failing together do not retry in lockstep.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let bound = self.base_delay.as_nanos().min(u64::MAX as u128) as u64;
        if !self.jitter || bound == 0 {
            return delay;
        }
        let jitter = rand::rng().random_range(0..bound);
        delay.saturating_add(Duration::from_nanos(jitter))
    }
}
