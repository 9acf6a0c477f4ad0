//! Linear backoff: the delay grows by a fixed step after every attempt.

use super::strategy::BackoffStrategy;
use crate::error::{Error, Result};
use std::time::Duration;

/// Backoff whose delay is `base + attempt * step`.
///
/// This is the cadence the backoff scheduler runs on: with a base and step of
/// one second, consecutive waits are 1s, 2s, 3s, ...
///
/// # Examples
///
/// ```rust
/// use pacer_core::retry::{BackoffStrategy, LinearBackoff};
/// use std::time::Duration;
///
/// let backoff = LinearBackoff::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
/// assert_eq!(backoff.next_delay(0), Some(Duration::from_secs(1)));
/// assert_eq!(backoff.next_delay(6), Some(Duration::from_secs(7)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    base: Duration,
    step: Duration,
    max_retries: u32,
}

impl LinearBackoff {
    /// Create a linear backoff with unbounded retries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `base` or `step` is zero.
    pub fn new(base: Duration, step: Duration) -> Result<Self> {
        if base.is_zero() {
            return Err(Error::invalid_config("backoff base must be positive"));
        }
        if step.is_zero() {
            return Err(Error::invalid_config("backoff step must be positive"));
        }
        Ok(Self {
            base,
            step,
            max_retries: u32::MAX,
        })
    }

    /// Limit the number of retries after the initial attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The first delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Growth per attempt.
    pub fn step(&self) -> Duration {
        self.step
    }
}

impl BackoffStrategy for LinearBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        Some(self.base.saturating_add(self.step.saturating_mul(attempt)))
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
