//! Error types shared by the pacer crates.
//!
//! Configuration mistakes are reported when a component is built.
//! Cancellation is an ordinary value returned to the caller.

use thiserror::Error;

use crate::context::CancelReason;

/// Result type alias for operations that can fail with a pacer error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pacer components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A component was constructed with an invalid parameter
    /// (non-positive interval, zero capacity, non-finite rate, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration source held a value that could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The context was cancelled explicitly.
    #[error("context cancelled")]
    Cancelled,

    /// The context deadline passed, or would pass before the operation
    /// could complete.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A background task panicked or was aborted before reporting a result.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    /// Whether this error means the caller's context is done.
    ///
    /// Callers layering retry policies on top of pacer components should stop
    /// retrying when this returns `true`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// The cancellation reason carried by this error, if any.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Error::Cancelled => Some(CancelReason::Cancelled),
            Error::DeadlineExceeded => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => Error::Cancelled,
            CancelReason::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}
