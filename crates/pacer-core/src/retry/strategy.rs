//! The retry strategy trait and its cancellable execution loop.

use async_trait::async_trait;
use std::error::Error;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::context::{CancelReason, Context};

/// Why a retried operation did not produce a value.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed and the strategy chose not to try again.
    #[error(transparent)]
    Operation(E),

    /// The context was done before the operation succeeded.
    #[error("retry interrupted: {0}")]
    Interrupted(CancelReason),
}

impl<E> RetryError<E> {
    /// Whether the retry loop stopped because the context was done.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RetryError::Interrupted(_))
    }

    /// The last operation error, if the loop ended on one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(err) => Some(err),
            RetryError::Interrupted(_) => None,
        }
    }
}

/// A strategy for retrying failed operations with backoff.
///
/// Implementations decide how long to wait between attempts and when to give
/// up. The provided [`execute`](BackoffStrategy::execute) loop sleeps on the
/// supplied clock and stops as soon as the context is done, whether that
/// happens while the operation runs or while waiting for the next attempt.
///
/// # Examples
///
/// ```rust
/// use pacer_core::clock::TokioClock;
/// use pacer_core::context::Context;
/// use pacer_core::retry::{BackoffStrategy, LinearBackoff};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backoff = LinearBackoff::new(Duration::from_millis(100), Duration::from_millis(100))?
///     .with_max_retries(3);
/// let ctx = Context::new();
///
/// let value = backoff
///     .execute(&ctx, &TokioClock, || async { Ok::<_, std::io::Error>(42) })
///     .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait BackoffStrategy: Send + Sync {
    /// Execute an operation with retry logic.
    ///
    /// The operation is called until it succeeds, returns an error that
    /// [`should_retry`](BackoffStrategy::should_retry) rejects, exhausts
    /// [`max_retries`](BackoffStrategy::max_retries), or the context is done.
    async fn execute<F, Fut, T, E>(
        &self,
        ctx: &Context,
        clock: &dyn Clock,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Error + Send + Sync + 'static,
    {
        let mut attempt = 0;
        loop {
            // select! builds every branch before polling, so check first to
            // avoid starting an operation on a context that is already done.
            if let Some(reason) = ctx.err() {
                return Err(RetryError::Interrupted(reason));
            }
            let outcome = tokio::select! {
                biased;
                reason = ctx.done() => return Err(RetryError::Interrupted(reason)),
                outcome = operation() => outcome,
            };

            match outcome {
                Ok(result) => {
                    #[cfg(feature = "tracing")]
                    if attempt > 0 {
                        tracing::trace!(attempts = attempt + 1, "Retry succeeded");
                    }
                    return Ok(result);
                }
                Err(err) if !self.should_retry(&err, attempt) => {
                    return Err(RetryError::Operation(err));
                }
                Err(err) if attempt >= self.max_retries() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempts = attempt + 1, error = %err, "Retries exhausted");
                    return Err(RetryError::Operation(err));
                }
                Err(err) => {
                    let Some(delay) = self.next_delay(attempt) else {
                        return Err(RetryError::Operation(err));
                    };
                    #[cfg(feature = "tracing")]
                    tracing::trace!(attempt, ?delay, error = %err, "Retrying after delay");
                    tokio::select! {
                        biased;
                        reason = ctx.done() => return Err(RetryError::Interrupted(reason)),
                        () = clock.sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Determine if an error is retryable.
    ///
    /// Default implementation returns `true` for all errors.
    fn should_retry(&self, error: &dyn Error, attempt: u32) -> bool {
        let _ = (error, attempt);
        true
    }

    /// Delay before the retry that follows failed attempt `attempt`
    /// (0-indexed), or `None` to stop retrying.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Maximum number of retries after the initial attempt.
    fn max_retries(&self) -> u32;
}
