//! Cancellation contexts.
//!
//! A [`Context`] is a one-shot, broadcast "done" signal with a reason that can
//! be read after it fires. It wraps a [`CancellationToken`] and optionally a
//! deadline measured on a [`Clock`].
//!
//! - Cancelling is idempotent; the first reason recorded sticks.
//! - Children observe their parent's cancellation and inherit the earlier of
//!   the two deadlines.
//! - Waiting on [`Context::done`] races the token against the deadline with
//!   the token polled first.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::{Instant, SharedClock};
use crate::error::{Error, Result};

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// [`Context::cancel`] was called on this context or an ancestor.
    Cancelled,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("context cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

#[derive(Clone)]
struct Deadline {
    at: Instant,
    clock: SharedClock,
}

struct Inner {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
    deadline: Option<Deadline>,
    parent: Option<Context>,
}

/// A cheaply clonable cancellation handle.
///
/// Clones refer to the same signal; cancelling any clone cancels all of them.
///
/// # Examples
///
/// ```rust
/// use pacer_core::context::{CancelReason, Context};
///
/// let ctx = Context::new();
/// let child = ctx.child();
/// assert!(!child.is_done());
///
/// ctx.cancel();
/// assert_eq!(child.err(), Some(CancelReason::Cancelled));
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A root context that is only done once cancelled.
    pub fn new() -> Self {
        Self::build(CancellationToken::new(), None, None)
    }

    /// A root context that is done at `at` on `clock`, or when cancelled.
    pub fn with_deadline(clock: SharedClock, at: Instant) -> Self {
        Self::build(CancellationToken::new(), Some(Deadline { at, clock }), None)
    }

    /// A root context that is done `timeout` from now on `clock`, or when
    /// cancelled.
    pub fn with_timeout(clock: SharedClock, timeout: Duration) -> Self {
        match clock.now().checked_add(timeout) {
            Some(at) => Self::with_deadline(clock, at),
            None => Self::new(),
        }
    }

    /// A child that is cancelled with this context but can also be cancelled
    /// on its own.
    pub fn child(&self) -> Self {
        Self::build(
            self.inner.token.child_token(),
            self.inner.deadline.clone(),
            Some(self.clone()),
        )
    }

    /// A child whose deadline is the earlier of `at` and this context's
    /// deadline.
    pub fn child_with_deadline(&self, clock: SharedClock, at: Instant) -> Self {
        let deadline = match &self.inner.deadline {
            Some(parent) if parent.at <= at => parent.clone(),
            _ => Deadline { at, clock },
        };
        Self::build(
            self.inner.token.child_token(),
            Some(deadline),
            Some(self.clone()),
        )
    }

    /// A child that times out `timeout` from now on `clock`.
    pub fn child_with_timeout(&self, clock: SharedClock, timeout: Duration) -> Self {
        match clock.now().checked_add(timeout) {
            Some(at) => self.child_with_deadline(clock, at),
            None => self.child(),
        }
    }

    fn build(token: CancellationToken, deadline: Option<Deadline>, parent: Option<Context>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                reason: OnceLock::new(),
                deadline,
                parent,
            }),
        }
    }

    /// Cancel this context and every child derived from it.
    ///
    /// Calling this more than once, or after the deadline passed, has no
    /// further effect.
    pub fn cancel(&self) {
        if self.err().is_none() {
            let _ = self.inner.reason.set(CancelReason::Cancelled);
            #[cfg(feature = "tracing")]
            tracing::trace!("context cancelled");
        }
        self.inner.token.cancel();
    }

    /// The deadline of this context, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline.as_ref().map(|d| d.at)
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .as_ref()
            .map(|d| d.at.saturating_duration_since(d.clock.now()))
    }

    /// Whether the context is done.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The reason this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<CancelReason> {
        let inner = &self.inner;
        if let Some(reason) = inner.reason.get() {
            return Some(*reason);
        }
        if let Some(reason) = inner.parent.as_ref().and_then(Context::err) {
            return Some(self.finish(reason));
        }
        if let Some(deadline) = &inner.deadline
            && deadline.clock.now() >= deadline.at
        {
            return Some(self.finish(CancelReason::DeadlineExceeded));
        }
        if inner.token.is_cancelled() {
            return Some(self.finish(CancelReason::Cancelled));
        }
        None
    }

    /// [`Context::err`] as a pacer [`Error`].
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }

    /// Wait until the context is done and return why.
    ///
    /// If cancellation and the deadline become ready together, the
    /// cancellation is observed first.
    pub async fn done(&self) -> CancelReason {
        if let Some(reason) = self.err() {
            return reason;
        }
        match &self.inner.deadline {
            Some(deadline) => {
                let expired = deadline.clock.sleep_until(deadline.at);
                tokio::select! {
                    biased;
                    () = self.inner.token.cancelled() => {}
                    () = expired => {}
                }
            }
            None => self.inner.token.cancelled().await,
        }
        self.err().unwrap_or(CancelReason::Cancelled)
    }

    /// The underlying token, for interop with code that speaks
    /// `tokio_util` directly. Cancelling it cancels this context.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    fn finish(&self, reason: CancelReason) -> CancelReason {
        let reason = *self.inner.reason.get_or_init(|| reason);
        self.inner.token.cancel();
        reason
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline())
            .field("err", &self.inner.reason.get())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Drive `future` to completion unless `ctx` is done first.
///
/// A context that is already done wins even if the future would complete on
/// its first poll.
///
/// # Examples
///
/// ```rust
/// use pacer_core::context::{run_until, Context};
///
/// # async fn example() -> pacer_core::Result<()> {
/// let ctx = Context::new();
/// let value = run_until(&ctx, async { 42 }).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn run_until<F, T>(ctx: &Context, future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        reason = ctx.done() => Err(Error::from(reason)),
        value = future => Ok(value),
    }
}
