//! Deadline enforcement and cooperative cancellation.
//!
//! The deadline is the request context's own timeout when set, otherwise the
//! configured default. Expiry fails with `CourierError::Timeout`; a cancelled
//! context token fails with `CourierError::Cancelled`.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::{Request, RequestContext};

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

#[derive(Debug, Clone, Copy)]
pub struct TimeoutBehavior {
    default_timeout: Duration,
}

impl TimeoutBehavior {
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

#[async_trait]
impl<R: Request> Behavior<RequestContext, R, R::Response> for TimeoutBehavior {
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        if ctx.is_cancelled() {
            return Err(CourierError::Cancelled);
        }

        let timeout = ctx.timeout.unwrap_or(self.default_timeout);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => {
                tracing::debug!(request = R::name(), "request cancelled by caller");
                Err(CourierError::Cancelled)
            }
            outcome = tokio::time::timeout(timeout, next.run(ctx, request)) => match outcome {
                Ok(result) => result,
                Err(_elapsed) => Err(CourierError::Timeout { timeout_ms }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
