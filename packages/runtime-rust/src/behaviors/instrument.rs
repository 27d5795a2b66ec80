//! Request instrumentation: one span per request plus request metrics.
//!
//! Emits `courier_requests_total{request, kind, outcome}` and
//! `courier_request_duration_seconds{request, kind}`.

use std::time::Instant;

use async_trait::async_trait;
use courier_core::{Request, RequestContext};
use tracing::{info_span, Instrument};

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

/// Outermost standard behavior. Observes every other behavior's effect,
/// including load-shed rejections and timeouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstrumentBehavior;

#[async_trait]
impl<R: Request> Behavior<RequestContext, R, R::Response> for InstrumentBehavior {
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        let span = info_span!(
            "request",
            request = R::name(),
            kind = R::KIND.as_str(),
            correlation_id = %ctx.correlation_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = next.run(ctx, request).await;
            let elapsed = start.elapsed();

            let outcome = match &result {
                Ok(_) => "ok",
                Err(err) => err.kind().as_str(),
            };

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);

            metrics::counter!(
                "courier_requests_total",
                "request" => R::name(),
                "kind" => R::KIND.as_str(),
                "outcome" => outcome,
            )
            .increment(1);
            metrics::histogram!(
                "courier_request_duration_seconds",
                "request" => R::name(),
                "kind" => R::KIND.as_str(),
            )
            .record(elapsed.as_secs_f64());

            match &result {
                Ok(_) => tracing::debug!(duration_ms, "request complete"),
                Err(err) => tracing::warn!(duration_ms, outcome, error = %err, "request failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
