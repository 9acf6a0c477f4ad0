//! Retry strategies for operations layered on top of the pacer primitives.
//!
//! The backoff scheduler governs *cadence*; deciding whether a failed
//! operation should run again is a caller concern. This module provides that
//! caller-side policy: a [`BackoffStrategy`] picks the delay between attempts
//! and its `execute` loop honours a [`Context`](crate::context::Context).
//!
//! # Key Types
//!
//! - [`BackoffStrategy`] - Core trait for retry strategies
//! - [`LinearBackoff`] - Delay grows by a fixed step
//! - [`RetryError`] - Operation failure or interruption

mod linear;
mod strategy;

pub use linear::LinearBackoff;
pub use strategy::{BackoffStrategy, RetryError};
