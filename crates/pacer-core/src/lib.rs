#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core abstractions for the pacer crates.
//!
//! - **Injectable time** via the [`Clock`](clock::Clock) trait, with a tokio
//!   implementation and a manually advanced one for deterministic tests
//! - **Cancellation** via [`Context`](context::Context): a broadcast, one-shot
//!   done signal with a readable reason and optional deadline
//! - **Retry strategies** via [`BackoffStrategy`](retry::BackoffStrategy)
//!   whose execution loop stops as soon as the context is done
//! - **A shared error type** for configuration and cancellation failures
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use pacer_core::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let clock: SharedClock = Arc::new(TokioClock);
//! let ctx = Context::with_timeout(Arc::clone(&clock), Duration::from_secs(5));
//!
//! let backoff = LinearBackoff::new(Duration::from_millis(100), Duration::from_millis(100))?
//!     .with_max_retries(3);
//!
//! let value = backoff
//!     .execute(&ctx, clock.as_ref(), || async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod context;
pub mod error;
pub mod retry;

pub use error::{Error, Result};

/// Convenient re-exports of commonly used items.
pub mod prelude {
    pub use crate::clock::{Clock, Instant, ManualClock, SharedClock, Timer, TokioClock};
    pub use crate::context::{CancelReason, Context, run_until};
    pub use crate::error::{Error, Result};
    pub use crate::retry::{BackoffStrategy, LinearBackoff, RetryError};
}
