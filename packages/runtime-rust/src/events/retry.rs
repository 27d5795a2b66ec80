//! Bounded retry with an explicit backoff schedule.
//!
//! A policy is a list of delays: attempt `n + 1` runs after `delays[n]`, so a
//! policy with five delays allows six attempts in total. Waiting goes through
//! [`Backoff`] so tests can observe or skip the delays, and every wait races
//! the caller's cancellation token.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_RETRY_DELAYS_MS;

/// Waits between attempts.
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// [`Backoff`] on the tokio timer. Honors paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait]
impl Backoff for TokioBackoff {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RETRY_DELAYS_MS)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    #[must_use]
    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    /// Single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Sum of every delay, i.e. the minimum time spent before the last attempt.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Run `op` until it succeeds, the schedule is exhausted, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. Cancellation is checked
    /// between attempts only; a running attempt is never interrupted.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        backoff: &dyn Backoff,
        mut op: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut delays = self.delays.iter();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "succeeded after retry");
                    }
                    return RetryOutcome {
                        attempts: attempt,
                        result: Ok(value),
                    };
                }
                Err(err) => err,
            };

            let Some(&delay) = delays.next() else {
                tracing::warn!(attempt, error = %err, "retries exhausted");
                return RetryOutcome {
                    attempts: attempt,
                    result: Err(RetryError::Exhausted { last: err }),
                };
            };

            if cancel.is_cancelled() {
                return RetryOutcome {
                    attempts: attempt,
                    result: Err(RetryError::Cancelled { last: err }),
                };
            }

            #[allow(clippy::cast_possible_truncation)]
            let delay_ms = delay.as_millis() as u64;
            tracing::debug!(attempt, delay_ms, error = %err, "attempt failed, backing off");

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return RetryOutcome {
                        attempts: attempt,
                        result: Err(RetryError::Cancelled { last: err }),
                    };
                }
                () = backoff.wait(delay) => {}
            }
        }
    }
}

/// Result of [`RetryPolicy::run`] together with how many attempts were made.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub attempts: u32,
    pub result: Result<T, RetryError>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("retries exhausted: {last}")]
    Exhausted { last: anyhow::Error },
    #[error("cancelled before retry: {last}")]
    Cancelled { last: anyhow::Error },
}

impl RetryError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Error of the final attempt.
    #[must_use]
    pub fn last(&self) -> &anyhow::Error {
        match self {
            Self::Exhausted { last } | Self::Cancelled { last } => last,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
