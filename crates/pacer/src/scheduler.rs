//! Cancellable backoff scheduler.
//!
//! A [`BackoffScheduler`] fires an action on a cadence that slows down after
//! every fire: the first fire happens `base` after start, and each following
//! wait is one `step` longer than the previous one. The loop runs until its
//! [`Context`] is done.
//!
//! ```text
//! Idle -> Scheduled -> (Fired -> Scheduled)* -> Cancelled
//! ```
//!
//! The loop owns a single [`Timer`] and resets it after each fire, and it
//! always checks the context before the timer, so a cancellation that
//! becomes visible in the same instant as an expiry wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SharedClock, Timer, TokioClock};
use crate::config::SchedulerConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::retry::{BackoffStrategy, LinearBackoff};

/// Runs an action on a linearly growing interval until cancelled.
///
/// # Examples
///
/// ```rust
/// use pacer::context::Context;
/// use pacer::scheduler::BackoffScheduler;
/// use std::time::Duration;
///
/// # async fn example() -> pacer::Result<()> {
/// let scheduler = BackoffScheduler::builder()
///     .base(Duration::from_secs(1))
///     .step(Duration::from_secs(1))
///     .build()?;
///
/// let ctx = Context::new();
/// let handle = scheduler.start(ctx.clone(), || println!("tick"));
///
/// tokio::time::sleep(Duration::from_secs(35)).await;
/// ctx.cancel();
/// let fires = handle.join().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    cadence: LinearBackoff,
    clock: SharedClock,
}

impl BackoffScheduler {
    /// Create a new builder. Defaults to a one second base and step on the
    /// tokio clock.
    pub fn builder() -> BackoffSchedulerBuilder {
        BackoffSchedulerBuilder::default()
    }

    /// Create a scheduler from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either duration is zero.
    pub fn from_config(config: &SchedulerConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cadence: LinearBackoff::new(config.base, config.step)?,
            clock,
        })
    }

    /// Wait before the first fire.
    pub fn base(&self) -> Duration {
        self.cadence.base()
    }

    /// Growth of the wait after every fire.
    pub fn step(&self) -> Duration {
        self.cadence.step()
    }

    /// Spawn the scheduling loop on the current tokio runtime.
    ///
    /// `action` runs inline in the loop, so a slow action delays the next
    /// timer. The loop stops when `ctx` is done; dropping the returned handle
    /// does not stop it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<F>(&self, ctx: Context, action: F) -> BackoffHandle
    where
        F: FnMut() + Send + 'static,
    {
        let attempts = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(
            self.cadence,
            Arc::clone(&self.clock),
            ctx,
            Arc::clone(&attempts),
            action,
        ));
        BackoffHandle { attempts, task }
    }
}

async fn run<F>(
    cadence: LinearBackoff,
    clock: SharedClock,
    ctx: Context,
    attempts: Arc<AtomicU64>,
    mut action: F,
) -> u64
where
    F: FnMut(),
{
    let Some(mut timer) = Timer::after(Arc::clone(&clock), cadence.base()) else {
        warn!(base = ?cadence.base(), "Backoff deadline out of range; waiting for cancellation");
        let reason = ctx.done().await;
        debug!(%reason, attempts = 0, "Backoff scheduler stopped");
        return 0;
    };
    debug!(base = ?cadence.base(), step = ?cadence.step(), "Backoff scheduler started");

    let mut fired: u64 = 0;
    loop {
        tokio::select! {
            biased;
            reason = ctx.done() => {
                debug!(%reason, attempts = fired, "Backoff scheduler stopped");
                return fired;
            }
            () = &mut timer => {}
        }

        action();
        fired += 1;
        attempts.store(fired, Ordering::Release);

        let attempt = u32::try_from(fired).unwrap_or(u32::MAX);
        let interval = cadence.next_delay(attempt).unwrap_or(Duration::MAX);
        trace!(attempts = fired, ?interval, "Backoff fired");

        match clock.now().checked_add(interval) {
            Some(deadline) => timer.reset(deadline),
            None => {
                warn!(attempts = fired, ?interval, "Backoff deadline out of range; waiting for cancellation");
                let reason = ctx.done().await;
                debug!(%reason, attempts = fired, "Backoff scheduler stopped");
                return fired;
            }
        }
    }
}

/// Handle to a running backoff loop.
#[derive(Debug)]
pub struct BackoffHandle {
    attempts: Arc<AtomicU64>,
    task: JoinHandle<u64>,
}

impl BackoffHandle {
    /// Number of completed fires so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit and return the final number of fires.
    ///
    /// The loop only exits once its context is done, so cancel the context
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if the action panicked or the task was
    /// aborted by the runtime.
    pub async fn join(self) -> Result<u64> {
        self.task
            .await
            .map_err(|err| Error::TaskFailed(err.to_string()))
    }
}

/// Builder for configuring a [`BackoffScheduler`].
#[derive(Debug, Default)]
pub struct BackoffSchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<SharedClock>,
}

impl BackoffSchedulerBuilder {
    /// Wait before the first fire. Default: 1s
    pub fn base(mut self, base: Duration) -> Self {
        self.config.base = base;
        self
    }

    /// Growth of the wait after every fire. Default: 1s
    pub fn step(mut self, step: Duration) -> Self {
        self.config.step = step;
        self
    }

    /// Clock to schedule on. Default: [`TokioClock`]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and build the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `base` or `step` is zero.
    pub fn build(self) -> Result<BackoffScheduler> {
        let clock = self.clock.unwrap_or_else(TokioClock::shared);
        BackoffScheduler::from_config(&self.config, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Mutex;

    fn one_second_scheduler(clock: SharedClock) -> BackoffScheduler {
        BackoffScheduler::builder()
            .base(Duration::from_secs(1))
            .step(Duration::from_secs(1))
            .clock(clock)
            .build()
            .unwrap()
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_rejects_zero_durations() {
        let err = BackoffScheduler::builder()
            .base(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = BackoffScheduler::builder()
            .step(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_over_35_seconds() {
        let scheduler = one_second_scheduler(TokioClock::shared());
        let ctx = Context::new();
        let handle = scheduler.start(ctx.clone(), || {});

        tokio::time::sleep(Duration::from_secs(35)).await;
        ctx.cancel();

        // Fires at 1, 3, 6, 10, 15, 21 and 28 seconds; the next is due at 36.
        assert_eq!(handle.join().await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_times_follow_interval_invariant() {
        let clock = TokioClock::shared();
        let start = clock.now();
        let scheduler = BackoffScheduler::builder()
            .base(Duration::from_millis(500))
            .step(Duration::from_millis(250))
            .clock(Arc::clone(&clock))
            .build()
            .unwrap();
        let fired_at = Arc::new(Mutex::new(Vec::new()));
        let ctx = Context::new();

        let recorder = Arc::clone(&fired_at);
        let timer_clock = Arc::clone(&clock);
        let handle = scheduler.start(ctx.clone(), move || {
            recorder
                .lock()
                .unwrap()
                .push(timer_clock.now() - start);
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        ctx.cancel();
        let fires = handle.join().await.unwrap();

        let fired_at = fired_at.lock().unwrap();
        assert_eq!(fires, fired_at.len() as u64);
        // Interval before the Nth fire is base + (N-1) * step.
        let mut expected = Duration::ZERO;
        for (n, at) in fired_at.iter().enumerate() {
            expected += Duration::from_millis(500) + Duration::from_millis(250) * n as u32;
            assert_eq!(*at, expected, "fire #{}", n + 1);
        }
        // 0.5 + 0.75 + 1.0 + 1.25 = 3.5s; the fifth fire would land at 5.0s.
        assert_eq!(fires, 4);
    }

    #[tokio::test]
    async fn test_cancel_before_first_fire() {
        let clock = ManualClock::new();
        let scheduler = one_second_scheduler(Arc::new(clock.clone()));
        let ctx = Context::new();
        let handle = scheduler.start(ctx.clone(), || panic!("must not fire"));

        settle().await;
        clock.advance(Duration::from_millis(999));
        settle().await;
        ctx.cancel();

        assert_eq!(handle.join().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_simultaneous_expiry() {
        let clock = ManualClock::new();
        let scheduler = one_second_scheduler(Arc::new(clock.clone()));
        let ctx = Context::new();
        let handle = scheduler.start(ctx.clone(), || {});

        settle().await;
        clock.advance(Duration::from_secs(1));
        settle().await;
        assert_eq!(handle.attempts(), 1);

        // The second fire is due at t=3s. Make the timer ready and cancel
        // without letting the loop run in between.
        clock.advance(Duration::from_secs(2));
        ctx.cancel();

        assert_eq!(handle.join().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_fire_lost_across_resets() {
        let clock = ManualClock::new();
        let scheduler = one_second_scheduler(Arc::new(clock.clone()));
        let ctx = Context::new();
        let handle = scheduler.start(ctx.clone(), || {});
        settle().await;

        // Step exactly onto each deadline: 1, 3, 6, 10.
        for (interval, expected) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            clock.advance(Duration::from_secs(interval));
            settle().await;
            assert_eq!(handle.attempts(), expected);
        }

        ctx.cancel();
        assert_eq!(handle.join().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_panicking_action_reports_task_failure() {
        let clock = ManualClock::new();
        let scheduler = one_second_scheduler(Arc::new(clock.clone()));
        let handle = scheduler.start(Context::new(), || panic!("action blew up"));
        settle().await;

        clock.advance(Duration::from_secs(1));

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, Error::TaskFailed(_)));
    }
}
