//! # pacer
//!
//! Pacing primitives for resilient clients:
//! - A cancellable backoff scheduler whose interval grows by a fixed step
//!   after every fire
//! - A token-bucket rate limiter with blocking, cancellable acquisition
//! - An injectable clock, so both can be driven through hours of virtual
//!   time in tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pacer::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> pacer::Result<()> {
//!     let ctx = Context::new();
//!
//!     let scheduler = BackoffScheduler::builder()
//!         .base(Duration::from_secs(1))
//!         .step(Duration::from_secs(1))
//!         .build()?;
//!     let handle = scheduler.start(ctx.clone(), || println!("cleanup"));
//!
//!     let limiter = TokenBucket::new(1, 1.0)?;
//!     for _ in 0..3 {
//!         limiter.wait(&ctx).await?;
//!         println!("request");
//!     }
//!
//!     ctx.cancel();
//!     handle.join().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use config::PacerConfig;
pub use error::{Error, Result};
pub use limiter::TokenBucket;
pub use scheduler::{BackoffHandle, BackoffScheduler};

// Core building blocks, re-exported so callers need a single dependency
pub use pacer_core::{clock, context, error, retry};

// Module declarations
pub mod config;
pub mod limiter;
pub mod scheduler;

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use pacer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BackoffHandle, BackoffScheduler, Error, PacerConfig, Result, TokenBucket,
        clock::{Clock, ManualClock, SharedClock, TokioClock},
        config::{LimiterConfig, PacerConfigBuilder, SchedulerConfig},
        context::{CancelReason, Context, run_until},
        retry::{BackoffStrategy, LinearBackoff, RetryError},
    };
}

/// Crate version, automatically updated from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
