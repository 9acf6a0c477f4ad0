//! Injectable time sources.
//!
//! Every pacer component reads time and sleeps exclusively through the
//! [`Clock`] trait, so the same code runs against tokio's timer in production
//! and against a fully controlled clock in tests.
//!
//! - [`TokioClock`] delegates to `tokio::time`. Under a paused runtime
//!   (`#[tokio::test(start_paused = true)]`) tokio auto-advances time whenever
//!   every task is idle, which makes this the virtual clock for long-running
//!   scenarios (hours of simulated time in milliseconds of wall time).
//! - [`ManualClock`] never moves on its own. Tests call
//!   [`ManualClock::advance`] to step time, which is what makes it possible
//!   to make a timer and a cancellation ready at the same instant.
//! - [`Timer`] is a resettable deadline over any clock.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::watch;

pub use tokio::time::Instant;

/// A boxed, owned sleep future returned by [`Clock::sleep_until`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A clock shared between components.
pub type SharedClock = Arc<dyn Clock>;

/// A monotonic time source that can also deliver a notification at a deadline.
///
/// # Examples
///
/// ```rust
/// use pacer_core::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(3));
/// assert_eq!(clock.now() - start, Duration::from_secs(3));
/// ```
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    /// Current instant according to this clock.
    fn now(&self) -> Instant;

    /// A future that completes once this clock reaches `deadline`.
    ///
    /// Completes immediately if the deadline has already passed. Dropping the
    /// future cancels the notification.
    fn sleep_until(&self, deadline: Instant) -> Sleep;

    /// A future that completes after `duration` has elapsed on this clock.
    fn sleep(&self, duration: Duration) -> Sleep {
        match self.now().checked_add(duration) {
            Some(deadline) => self.sleep_until(deadline),
            None => Box::pin(std::future::pending::<()>()),
        }
    }
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Create a tokio clock wrapped for sharing.
    pub fn shared() -> SharedClock {
        Arc::new(TokioClock)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same timeline. Sleepers subscribe to a `watch` channel
/// carrying the elapsed offset and re-check their deadline on every change.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<watch::Sender<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        let (elapsed, _) = watch::channel(Duration::ZERO);
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(elapsed),
        }
    }

    /// Time advanced since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.borrow()
    }

    /// Move time forward by `by`, waking every sleeper whose deadline is now
    /// reached.
    pub fn advance(&self, by: Duration) {
        self.elapsed.send_modify(|elapsed| *elapsed += by);
    }

    /// Move time forward to `elapsed` since creation. Time never goes
    /// backwards; earlier values are ignored.
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.elapsed.send_if_modified(|current| {
            if elapsed > *current {
                *current = elapsed;
                true
            } else {
                false
            }
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.borrow()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        let origin = self.origin;
        let mut elapsed = self.elapsed.subscribe();
        Box::pin(async move {
            loop {
                if origin + *elapsed.borrow_and_update() >= deadline {
                    return;
                }
                if elapsed.changed().await.is_err() {
                    // Every handle to the clock is gone; time is frozen.
                    std::future::pending::<()>().await;
                }
            }
        })
    }
}

/// A resettable deadline notification.
///
/// Resetting replaces the pending sleep, so a notification armed for the old
/// deadline can never be delivered afterwards.
pub struct Timer {
    clock: SharedClock,
    deadline: Instant,
    sleep: Sleep,
}

impl Timer {
    /// Arm a timer for `deadline`.
    pub fn new(clock: SharedClock, deadline: Instant) -> Self {
        let sleep = clock.sleep_until(deadline);
        Self {
            clock,
            deadline,
            sleep,
        }
    }

    /// Arm a timer `duration` from now, or `None` if that instant is not
    /// representable.
    pub fn after(clock: SharedClock, duration: Duration) -> Option<Self> {
        let deadline = clock.now().checked_add(duration)?;
        Some(Self::new(clock, deadline))
    }

    /// The instant this timer fires at.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the clock has reached the deadline.
    pub fn is_elapsed(&self) -> bool {
        self.clock.now() >= self.deadline
    }

    /// Re-arm the timer for a new deadline.
    pub fn reset(&mut self, deadline: Instant) {
        self.deadline = deadline;
        self.sleep = self.clock.sleep_until(deadline);
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.get_mut().sleep.as_mut().poll(cx)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("clock", &self.clock)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
