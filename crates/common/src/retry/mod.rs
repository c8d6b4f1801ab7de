//! Retry policy for remote calls
//!
//! A `RetryPolicy` bundles a maximum attempt count, a backoff function
//! (failed attempt index -> delay) and a predicate deciding which errors
//! are worth retrying. The `backoff` crate drives the loop; the policy
//! only supplies the schedule and the transient/permanent split.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::GenerationError;

type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
type RetryablePredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Reusable retry policy
pub struct RetryPolicy<E> {
    max_attempts: u32,
    backoff: BackoffFn,
    retryable: RetryablePredicate<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
            retryable: Arc::clone(&self.retryable),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// `2^attempt * base`: 1s, 2s, 4s for a one second base
pub fn exponential(base: Duration) -> impl Fn(u32) -> Duration + Send + Sync + 'static {
    move |attempt| base.saturating_mul(2u32.saturating_pow(attempt))
}

impl<E> RetryPolicy<E> {
    /// A zero attempt count is treated as one
    pub fn new<B, P>(max_attempts: u32, backoff: B, retryable: P) -> Self
    where
        B: Fn(u32) -> Duration + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
            retryable: Arc::new(retryable),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (0-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }

    pub fn is_retryable(&self, err: &E) -> bool {
        (self.retryable)(err)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out
    /// of attempts. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let schedule = AttemptSchedule {
            failed: 0,
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
        };
        let retryable = Arc::clone(&self.retryable);

        backoff::future::retry_notify(
            schedule,
            || {
                let attempt = operation();
                let retryable = Arc::clone(&retryable);
                async move {
                    attempt.await.map_err(|err| {
                        if retryable(&err) {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: E, wait: Duration| {
                tracing::warn!(
                    error = %err,
                    wait_ms = wait.as_millis() as u64,
                    "Retryable failure, backing off"
                );
            },
        )
        .await
    }
}

impl RetryPolicy<GenerationError> {
    /// Policy used for every text service call
    pub fn for_generation(max_attempts: u32, base: Duration) -> Self {
        Self::new(max_attempts, exponential(base), GenerationError::is_retryable)
    }
}

impl Default for RetryPolicy<GenerationError> {
    fn default() -> Self {
        Self::for_generation(3, Duration::from_secs(1))
    }
}

/// Attempt-counting schedule handed to the `backoff` crate
struct AttemptSchedule {
    failed: u32,
    max_attempts: u32,
    backoff: BackoffFn,
}

impl backoff::backoff::Backoff for AttemptSchedule {
    fn reset(&mut self) {
        self.failed = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let attempt = self.failed;
        self.failed += 1;
        if self.failed >= self.max_attempts {
            return None;
        }
        Some((self.backoff)(attempt))
    }
}
