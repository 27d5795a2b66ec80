//! Transaction boundary around command handlers.
//!
//! Commands run inside a unit of work that commits when the rest of the
//! chain succeeds and rolls back otherwise. Queries and operations pass
//! through untouched, as do commands when no factory is configured.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{Request, RequestContext, RequestKind, UnitOfWorkFactory};

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

#[derive(Clone, Default)]
pub struct UnitOfWorkBehavior {
    factory: Option<Arc<dyn UnitOfWorkFactory>>,
}

impl UnitOfWorkBehavior {
    #[must_use]
    pub fn new(factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        Self {
            factory: Some(factory),
        }
    }

    /// Behavior that never opens a unit of work.
    #[must_use]
    pub fn disabled() -> Self {
        Self { factory: None }
    }
}

#[async_trait]
impl<R: Request> Behavior<RequestContext, R, R::Response> for UnitOfWorkBehavior {
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        let factory = match &self.factory {
            Some(factory) if R::KIND == RequestKind::Command => factory,
            _ => return next.run(ctx, request).await,
        };

        let unit = factory.begin(ctx).await?;
        match next.run(ctx, request).await {
            Ok(response) => {
                unit.commit().await?;
                tracing::debug!(request = R::name(), "unit of work committed");
                Ok(response)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    tracing::error!(
                        request = R::name(),
                        error = %rollback_err,
                        "rollback failed after handler error"
                    );
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
