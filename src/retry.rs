//! Whole-operation retries for acquisition.
//!
//! The module uses a small trait-based design:
//! - [`Acquire`]: an async, zero-argument fallible operation
//! - [`FnAcquire`]: adapts a closure returning a future into [`Acquire`]
//! - [`Retry`]: decorator that re-invokes any [`Acquire`] up to N times
//!
//! # Retry Strategy
//!
//! - At most `max_attempts` sequential invocations; success returns immediately
//! - Non-retryable errors (storage, configuration) are returned untouched
//! - After the last failed attempt the caller gets
//!   [`ScrapeError::RetriesExhausted`] carrying the final underlying error
//! - Optional exponential backoff with jitter; a zero base delay disables it

use crate::error::{Result, ScrapeError};
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// An acquisition that may be attempted more than once.
pub trait Acquire {
    type Output;

    async fn acquire(&self) -> Result<Self::Output>;
}

/// Adapts `Fn() -> impl Future<Output = Result<T>>` into [`Acquire`].
pub struct FnAcquire<F>(pub F);

impl<F> fmt::Debug for FnAcquire<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAcquire")
    }
}

impl<F, Fut, T> Acquire for FnAcquire<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    type Output = T;

    async fn acquire(&self) -> Result<T> {
        (self.0)().await
    }
}

/// Re-invokes an [`Acquire`] until it succeeds or the attempt budget is spent.
///
/// # Backoff
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
///
/// With a zero `base_delay` attempts follow each other immediately.
pub struct Retry<T> {
    inner: T,
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> Retry<T>
where
    T: Acquire,
{
    /// `max_attempts` below one is treated as one.
    pub fn new(inner: T, max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for Retry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Acquire for Retry<T>
where
    T: Acquire,
{
    type Output = T::Output;

    #[instrument(level = "debug", skip_all, fields(max_attempts = self.max_attempts))]
    async fn acquire(&self) -> Result<Self::Output> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            attempt += 1;
            debug!(attempt, max = self.max_attempts, "Acquisition attempt");

            match self.inner.acquire().await {
                Ok(out) => return Ok(out),
                Err(e) if !e.is_retryable() => {
                    error!(attempt, error = %e, "Acquisition failed with a non-retryable error");
                    return Err(e);
                }
                Err(e) => {
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64;
                    let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;

                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_attempt,
                            elapsed_ms_total,
                            error = %e,
                            "Acquisition exhausted retries"
                        );
                        return Err(ScrapeError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "Acquisition attempt failed; retrying"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

/// Run `op` with up to `max_attempts` attempts.
pub async fn with_retries<F, Fut, T>(max_attempts: usize, base_delay: Duration, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Retry::new(FnAcquire(op), max_attempts, base_delay)
        .acquire()
        .await
}
