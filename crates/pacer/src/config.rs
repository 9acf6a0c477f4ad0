//! Configuration for pacer components.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Cadence of a [`BackoffScheduler`](crate::scheduler::BackoffScheduler).
///
/// The Nth fire happens `base + (N-1) * step` after the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wait before the first fire
    #[serde(rename = "base_ms", with = "millis")]
    pub base: Duration,

    /// Growth of the wait after every fire
    #[serde(rename = "step_ms", with = "millis")]
    pub step: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            step: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Check that both durations are positive.
    pub fn validate(&self) -> Result<()> {
        if self.base.is_zero() {
            return Err(Error::invalid_config("backoff base must be positive"));
        }
        if self.step.is_zero() {
            return Err(Error::invalid_config("backoff step must be positive"));
        }
        Ok(())
    }
}

/// Shape of a [`TokenBucket`](crate::limiter::TokenBucket).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Maximum tokens held (burst size)
    pub capacity: u32,

    /// Tokens added per second
    pub refill_rate: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            refill_rate: 1.0,
        }
    }
}

impl LimiterConfig {
    /// Check that capacity is non-zero and the rate is finite and positive.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::invalid_config("bucket capacity must be positive"));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(Error::invalid_config(format!(
                "refill rate must be a positive, finite number of tokens per second (got {})",
                self.refill_rate
            )));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    /// Backoff scheduler cadence
    pub scheduler: SchedulerConfig,

    /// Token bucket shape
    pub limiter: LimiterConfig,
}

impl PacerConfig {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// This will look for:
    /// - `PACER_BACKOFF_BASE_MS` for the first backoff wait
    /// - `PACER_BACKOFF_STEP_MS` for the backoff growth step
    /// - `PACER_LIMIT_CAPACITY` for the bucket capacity
    /// - `PACER_LIMIT_RATE` for the refill rate (tokens per second)
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Some(base) = env_var::<u64>("PACER_BACKOFF_BASE_MS")? {
            config.scheduler.base = Duration::from_millis(base);
        }
        if let Some(step) = env_var::<u64>("PACER_BACKOFF_STEP_MS")? {
            config.scheduler.step = Duration::from_millis(step);
        }
        if let Some(capacity) = env_var::<u32>("PACER_LIMIT_CAPACITY")? {
            config.limiter.capacity = capacity;
        }
        if let Some(rate) = env_var::<f64>("PACER_LIMIT_RATE")? {
            config.limiter.refill_rate = rate;
        }

        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.limiter.validate()
    }

    /// Merge this configuration with another, with the other taking
    /// precedence wherever it differs from the defaults.
    pub fn merge(mut self, other: PacerConfig) -> Self {
        let defaults = PacerConfig::default();
        if other.scheduler.base != defaults.scheduler.base {
            self.scheduler.base = other.scheduler.base;
        }
        if other.scheduler.step != defaults.scheduler.step {
            self.scheduler.step = other.scheduler.step;
        }
        if other.limiter.capacity != defaults.limiter.capacity {
            self.limiter.capacity = other.limiter.capacity;
        }
        if other.limiter.refill_rate != defaults.limiter.refill_rate {
            self.limiter.refill_rate = other.limiter.refill_rate;
        }
        self
    }
}

#[cfg(feature = "env")]
fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(None),
    }
}

/// Builder for creating a [`PacerConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct PacerConfigBuilder {
    config: PacerConfig,
}

impl PacerConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first backoff wait.
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.config.scheduler.base = base;
        self
    }

    /// Set the backoff growth step.
    pub fn backoff_step(mut self, step: Duration) -> Self {
        self.config.scheduler.step = step;
        self
    }

    /// Set the bucket capacity.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.limiter.capacity = capacity;
        self
    }

    /// Set the refill rate in tokens per second.
    pub fn refill_rate(mut self, refill_rate: f64) -> Self {
        self.config.limiter.refill_rate = refill_rate;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for non-positive durations, zero
    /// capacity, or a non-positive refill rate.
    pub fn build(self) -> Result<PacerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
