//! Retry policy with capped exponential backoff.

use std::time::Duration;

use super::error::ErrorClass;

/// Attempts granted to errors that are neither transient nor terminal.
const UNKNOWN_ERROR_ATTEMPTS: u32 = 2;

/// Bounded retry configuration for dispatching one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for transient failures, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the retry following attempt `attempt` (0-indexed):
    /// `min(base * 2^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Total attempts allowed for an error of the given class.
    pub fn attempts_for(&self, class: ErrorClass) -> u32 {
        match class {
            ErrorClass::Transient => self.max_attempts.max(1),
            ErrorClass::Unknown => UNKNOWN_ERROR_ATTEMPTS,
            ErrorClass::Validation | ErrorClass::Conflict => 1,
        }
    }
}
