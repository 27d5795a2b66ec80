//! Request handlers: the finalizer of every request pipeline.

use async_trait::async_trait;
use courier_core::{Request, RequestContext};

use crate::error::CourierError;
use crate::pipeline::Finalizer;

/// Handles one request type. Exactly one handler may be registered per request.
///
/// Handlers raise domain events through [`crate::events::raise`]; the events
/// are dispatched only if the whole pipeline run succeeds.
#[async_trait]
pub trait Handler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, ctx: &RequestContext, request: R) -> Result<R::Response, CourierError>;
}

#[async_trait]
impl<R, H> Finalizer<RequestContext, R, R::Response> for H
where
    R: Request,
    H: Handler<R>,
{
    async fn handle(&self, ctx: &RequestContext, request: R) -> Result<R::Response, CourierError> {
        Handler::handle(self, ctx, request).await
    }
}
