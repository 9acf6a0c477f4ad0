//! End-to-end runs over long stretches of virtual time
//!
//! Every test here starts with the tokio clock paused, so a day of pacing
//! finishes in well under a second of wall time.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use pacer::clock::TokioClock;
use pacer::context::{CancelReason, Context, run_until};
use pacer::limiter::SharedTokenBucket;
use pacer::prelude::*;

#[tokio::test(start_paused = true)]
async fn test_backoff_fires_seven_times_in_35_seconds() {
    common::init_tracing();

    let scheduler = BackoffScheduler::builder()
        .base(Duration::from_secs(1))
        .step(Duration::from_secs(1))
        .build()
        .unwrap();
    let counter = Arc::new(AtomicU64::new(0));
    let ctx = Context::new();

    let seen = Arc::clone(&counter);
    let handle = scheduler.start(ctx.clone(), move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_secs(35)).await;
    ctx.cancel();

    assert_eq!(handle.join().await.unwrap(), 7);
    assert_eq!(counter.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_stays_quiet_after_cancel() {
    let scheduler = BackoffScheduler::builder().build().unwrap();
    let counter = Arc::new(AtomicU64::new(0));
    let ctx = Context::new();

    let seen = Arc::clone(&counter);
    let handle = scheduler.start(ctx.clone(), move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    ctx.cancel();
    let fires = handle.join().await.unwrap();

    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(fires, 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_context_stops_backoff() {
    let scheduler = BackoffScheduler::builder().build().unwrap();
    let ctx = Context::with_timeout(TokioClock::shared(), Duration::from_secs(12));
    let handle = scheduler.start(ctx.clone(), || {});

    // Fires at 1, 3, 6 and 10 seconds; the deadline lands before 15.
    assert_eq!(handle.join().await.unwrap(), 4);
    assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
}

/// Spin on `wait` until `ctx` is done and report how many waits succeeded.
fn spin_on_wait(limiter: SharedTokenBucket, ctx: Context) -> tokio::task::JoinHandle<u64> {
    tokio::spawn(async move {
        let mut consumed: u64 = 0;
        loop {
            if ctx.is_done() {
                break;
            }
            if limiter.wait(&ctx).await.is_ok() {
                consumed += 1;
            }
        }
        consumed
    })
}

#[tokio::test(start_paused = true)]
async fn test_tight_loop_over_24_hours() {
    common::init_tracing();

    let limiter = Arc::new(TokenBucket::new(1, 1.0).unwrap());
    let ctx = Context::new();
    let worker = spin_on_wait(Arc::clone(&limiter), ctx.clone());

    // Grants land on whole seconds. Cancelling at 86400.5s leaves no grant
    // and no cancellation due at the same instant.
    tokio::time::sleep(Duration::from_secs(86_400) + Duration::from_millis(500)).await;
    ctx.cancel();

    // One token up front, then one per second for a day.
    assert_eq!(worker.await.unwrap(), 86_401);
}

#[tokio::test(start_paused = true)]
async fn test_tight_loop_cancelled_on_the_day_boundary() {
    let limiter = Arc::new(TokenBucket::new(1, 1.0).unwrap());
    let ctx = Context::new();
    let worker = spin_on_wait(Arc::clone(&limiter), ctx.clone());

    tokio::time::sleep(Duration::from_secs(86_400)).await;
    // The grant due at exactly 86400s fired with this sleep; let the worker
    // collect it before the cancel lands.
    common::settle().await;
    ctx.cancel();

    assert_eq!(worker.await.unwrap(), 86_401);
    // The waiter for 86401s handed its reservation back.
    assert_eq!(limiter.available(), 0.0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(limiter.try_acquire());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waiters_never_double_spend() {
    let limiter: SharedTokenBucket = Arc::new(TokenBucket::new(2, 1.0).unwrap());
    let ctx = Context::new();

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let ctx = ctx.clone();
            tokio::spawn(async move { limiter.wait(&ctx).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    ctx.cancel();

    let mut granted = 0;
    let mut cancelled = 0;
    for waiter in waiters {
        match waiter.await.unwrap() {
            Ok(()) => granted += 1,
            Err(Error::Cancelled) => cancelled += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // Two from the initial burst plus one per elapsed second.
    assert_eq!(granted, 6);
    assert_eq!(cancelled, 4);

    // Cancelled waiters handed their reservations back.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(limiter.try_acquire());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_shorter_than_refill_fails_fast() {
    let limiter = TokenBucket::new(1, 0.1).unwrap();
    assert!(limiter.try_acquire());

    let started = tokio::time::Instant::now();
    let ctx = Context::with_timeout(TokioClock::shared(), Duration::from_secs(5));
    let err = limiter.wait(&ctx).await.unwrap_err();

    assert_eq!(err, Error::DeadlineExceeded);
    assert_eq!(started.elapsed(), Duration::ZERO);

    // The next token is still due ten seconds after the first grant.
    let ctx = Context::with_timeout(TokioClock::shared(), Duration::from_secs(11));
    limiter.wait(&ctx).await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_beats_slow_operation() {
    let started = tokio::time::Instant::now();
    let ctx = Context::with_timeout(TokioClock::shared(), Duration::from_secs(10));

    let outcome = run_until(&ctx, tokio::time::sleep(Duration::from_secs(15))).await;

    assert_eq!(outcome, Err(Error::DeadlineExceeded));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_fast_operation_beats_timeout() {
    let ctx = Context::with_timeout(TokioClock::shared(), Duration::from_secs(10));
    let value = run_until(&ctx, async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        "done"
    })
    .await;
    assert_eq!(value, Ok("done"));
    assert!(!ctx.is_done());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_from_many_tasks_is_idempotent() {
    let ctx = Context::new();
    let limiter = TokenBucket::new(1, 1.0).unwrap();
    assert!(limiter.try_acquire());

    let cancellers: Vec<_> = (0..8)
        .map(|_| {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancel() })
        })
        .collect();
    for canceller in cancellers {
        canceller.await.unwrap();
    }

    assert_eq!(ctx.err(), Some(CancelReason::Cancelled));
    assert_eq!(limiter.wait(&ctx).await, Err(Error::Cancelled));
    assert_eq!(limiter.wait(&ctx.child()).await, Err(Error::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_retry_shares_the_scheduler_cadence() {
    let backoff = LinearBackoff::new(Duration::from_secs(1), Duration::from_secs(1))
        .unwrap()
        .with_max_retries(3);
    let calls = Arc::new(AtomicU64::new(0));
    let started = tokio::time::Instant::now();

    let seen = Arc::clone(&calls);
    let result = backoff
        .execute(&Context::new(), &TokioClock, || {
            let seen = Arc::clone(&seen);
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(std::io::Error::other("flaky"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Waits of 1s then 2s between the three attempts.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}
