//! Structural validation through [`Request::validate`].

use async_trait::async_trait;
use courier_core::{Request, RequestContext};

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationBehavior;

#[async_trait]
impl<R: Request> Behavior<RequestContext, R, R::Response> for ValidationBehavior {
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        if let Err(errors) = request.validate() {
            tracing::debug!(request = R::name(), failures = errors.len(), "validation failed");
            return Err(CourierError::Validation(errors));
        }
        next.run(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::PipelineBuilder;
    use crate::testing::{fixture_catalog, run_once, Calls, Lookup, LookupHandler};

    #[tokio::test]
    async fn invalid_request_never_reaches_handler() {
        let calls = Arc::new(Calls::default());
        let mut catalog = fixture_catalog(&calls);
        catalog.instance(ValidationBehavior);
        let definition = PipelineBuilder::<RequestContext, Lookup, String>::new()
            .behavior::<ValidationBehavior>()
            .finalizer::<LookupHandler>();
        let request = Lookup {
            invalid: true,
            ..Lookup::new(1)
        };

        let err = run_once(catalog, definition, &RequestContext::new(), request)
            .await
            .unwrap_err();
        let CourierError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(calls.count(), 0);
    }

    #[tokio::test]
    async fn valid_request_reaches_handler() {
        let calls = Arc::new(Calls::default());
        let mut catalog = fixture_catalog(&calls);
        catalog.instance(ValidationBehavior);
        let definition = PipelineBuilder::<RequestContext, Lookup, String>::new()
            .behavior::<ValidationBehavior>()
            .finalizer::<LookupHandler>();

        let out = run_once(catalog, definition, &RequestContext::new(), Lookup::new(2))
            .await
            .unwrap();
        assert_eq!(out, "item-2");
        assert_eq!(calls.count(), 1);
    }
}
