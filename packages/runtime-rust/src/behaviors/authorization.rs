//! Permission checks against the configured [`Authorizer`].

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{AuthDecision, Authorizer, Request, RequestContext};

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

/// Consults the authorizer for requests that name a required permission.
/// Requests without one pass straight through.
#[derive(Clone)]
pub struct AuthorizationBehavior {
    authorizer: Arc<dyn Authorizer>,
}

impl AuthorizationBehavior {
    #[must_use]
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl<R: Request> Behavior<RequestContext, R, R::Response> for AuthorizationBehavior {
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        if let Some(permission) = request.required_permission() {
            let decision = self
                .authorizer
                .authorize(ctx.principal.as_ref(), permission)
                .await;
            match decision {
                AuthDecision::Allow => {}
                AuthDecision::Unauthenticated => {
                    tracing::info!(request = R::name(), permission, "unauthenticated request");
                    return Err(CourierError::Unauthenticated);
                }
                AuthDecision::Forbidden { reason } => {
                    tracing::info!(request = R::name(), permission, %reason, "request forbidden");
                    return Err(CourierError::Forbidden { reason });
                }
            }
        }
        next.run(ctx, request).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
