//! Load shedding: rejects requests once the concurrency limit is reached.
//!
//! Rejected requests fail immediately with `CourierError::Overloaded`
//! rather than queueing.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{Request, RequestContext};
use tokio::sync::Semaphore;

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

/// Semaphore-backed concurrency limit shared by every pipeline.
///
/// Register it as a singleton so all requests draw from the same permits.
#[derive(Debug, Clone)]
pub struct LoadShedBehavior {
    semaphore: Arc<Semaphore>,
}

impl LoadShedBehavior {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl<R: Request> Behavior<RequestContext, R, R::Response> for LoadShedBehavior {
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            tracing::warn!(request = R::name(), "shedding request, concurrency limit reached");
            return Err(CourierError::Overloaded);
        };

        // Held until the rest of the chain finishes.
        let result = next.run(ctx, request).await;
        drop(permit);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
