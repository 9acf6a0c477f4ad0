//! Token-bucket rate limiter with blocking acquisition.
//!
//! Tokens accrue continuously at `refill_rate` per second up to `capacity`.
//! Each successful [`TokenBucket::wait`] consumes one token. A caller that
//! finds the bucket empty *reserves* the next token by driving the balance
//! negative and then sleeps until that token has accrued, which is why a
//! caller spinning on `wait` is still held to the refill rate.
//!
//! # Thread Safety
//! The balance is guarded by a mutex that is never held across an await.
//! Order among concurrent waiters is unspecified.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::{Clock, Instant, SharedClock, TokioClock};
use crate::config::LimiterConfig;
use crate::context::Context;
use crate::error::{Error, Result};

#[derive(Debug)]
struct Bucket {
    /// Balance at `last`; negative while waiters hold reservations
    tokens: f64,
    last: Instant,
}

/// A capacity-bounded token bucket.
///
/// The bucket starts full.
///
/// # Example
/// ```rust
/// use pacer::context::Context;
/// use pacer::limiter::TokenBucket;
///
/// # async fn example() -> pacer::Result<()> {
/// let limiter = TokenBucket::new(1, 1.0)?; // one request per second
/// let ctx = Context::new();
///
/// limiter.wait(&ctx).await?; // immediate, the bucket starts full
/// limiter.wait(&ctx).await?; // about one second later
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    clock: SharedClock,
    state: Mutex<Bucket>,
}

impl TokenBucket {
    /// Create a bucket on the tokio clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `capacity` is zero or
    /// `refill_rate` is not a positive, finite number.
    pub fn new(capacity: u32, refill_rate: f64) -> Result<Self> {
        Self::with_clock(capacity, refill_rate, TokioClock::shared())
    }

    /// Create a bucket on the given clock.
    pub fn with_clock(capacity: u32, refill_rate: f64, clock: SharedClock) -> Result<Self> {
        Self::from_config(
            &LimiterConfig {
                capacity,
                refill_rate,
            },
            clock,
        )
    }

    /// Create a bucket from configuration.
    pub fn from_config(config: &LimiterConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let last = clock.now();
        Ok(Self {
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            clock,
            state: Mutex::new(Bucket {
                tokens: f64::from(config.capacity),
                last,
            }),
        })
    }

    /// Maximum tokens held.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens available right now, including any fraction still accruing.
    /// Zero while reservations are outstanding.
    pub fn available(&self) -> f64 {
        let now = self.clock.now();
        let mut bucket = self.lock();
        self.advance(&mut bucket, now);
        bucket.tokens.max(0.0)
    }

    /// Take a token if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut bucket = self.lock();
        self.advance(&mut bucket, now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            trace!(remaining = bucket.tokens, "Token acquired");
            true
        } else {
            false
        }
    }

    /// Wait until a token is available and consume it, or until `ctx` is
    /// done.
    ///
    /// A context that is already done fails immediately. If the context has a
    /// deadline that falls at or before the moment the next token accrues,
    /// this fails with
    /// [`Error::DeadlineExceeded`] right away instead of sleeping. A waiter
    /// interrupted by the context, or dropped before it is granted, returns
    /// its reserved token to the bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::DeadlineExceeded`]; no token
    /// is consumed in either case.
    pub async fn wait(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;

        let Some(ready_at) = self.reserve(ctx)? else {
            return Ok(());
        };

        // Returned to the bucket unless granted, including when this future
        // is dropped mid-wait.
        let reservation = Reservation {
            bucket: self,
            granted: false,
        };
        let ready = self.clock.sleep_until(ready_at);
        tokio::select! {
            biased;
            reason = ctx.done() => {
                drop(reservation);
                debug!(%reason, "Token wait interrupted");
                Err(Error::from(reason))
            }
            () = ready => {
                reservation.grant();
                trace!("Reserved token granted");
                Ok(())
            }
        }
    }

    /// Take one token, possibly into debt. Returns when the token will have
    /// accrued, or `None` if it is available now.
    fn reserve(&self, ctx: &Context) -> Result<Option<Instant>> {
        let now = self.clock.now();
        let mut bucket = self.lock();
        self.advance(&mut bucket, now);

        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            trace!(remaining = bucket.tokens, "Token acquired");
            return Ok(None);
        }

        let wait = Duration::try_from_secs_f64(-bucket.tokens / self.refill_rate)
            .unwrap_or(Duration::MAX);
        let ready_at = now.checked_add(wait);
        let misses_deadline = match (ready_at, ctx.deadline()) {
            (_, None) => false,
            (Some(ready_at), Some(deadline)) => ready_at >= deadline,
            (None, Some(_)) => true,
        };
        if misses_deadline || ready_at.is_none() {
            // Undo the reservation so the token stays available to others.
            bucket.tokens += 1.0;
            debug!(?wait, "Token would not accrue before the deadline");
            return Err(Error::DeadlineExceeded);
        }

        trace!(?wait, balance = bucket.tokens, "Token reserved");
        Ok(ready_at)
    }

    /// Give back a reservation that will not be used.
    fn release(&self) {
        let now = self.clock.now();
        let mut bucket = self.lock();
        self.advance(&mut bucket, now);
        bucket.tokens = (bucket.tokens + 1.0).min(f64::from(self.capacity));
    }

    fn advance(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last);
        if elapsed.is_zero() {
            return;
        }
        let accrued = elapsed.as_secs_f64() * self.refill_rate;
        bucket.tokens = (bucket.tokens + accrued).min(f64::from(self.capacity));
        bucket.last = now;
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // Every critical section leaves the bucket consistent, so a panic
        // elsewhere cannot poison the balance.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A token taken by a pending [`TokenBucket::wait`].
struct Reservation<'a> {
    bucket: &'a TokenBucket,
    granted: bool,
}

impl Reservation<'_> {
    fn grant(mut self) {
        self.granted = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.granted {
            self.bucket.release();
            trace!("Token reservation returned");
        }
    }
}

/// A bucket shared between tasks.
pub type SharedTokenBucket = Arc<TokenBucket>;
