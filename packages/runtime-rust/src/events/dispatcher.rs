//! Post-success dispatch of captured events, including cascades.
//!
//! Events are processed from a single worklist. Each event goes to every
//! listener registered for its concrete type, one listener at a time in
//! registration order. Events raised by a listener invocation are appended to
//! the end of the worklist once that invocation succeeds, so an event is
//! only dispatched after every event captured before it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use courier_core::{DomainEvent, RequestContext};
use futures_util::FutureExt;
use tracing::{debug_span, Instrument};

use super::capture;
use super::listener::{ListenerRegistry, ListenerSlot};
use super::record::{DispatchEntry, DispatchFailure, ExecutionRecord};
use super::retry::{Backoff, RetryOutcome, RetryPolicy, TokioBackoff};
use crate::scope::{ExecutionScope, ScopeFactory, ScopeGuard};

#[derive(Clone)]
pub struct EventDispatcher {
    listeners: Arc<ListenerRegistry>,
    scopes: Arc<dyn ScopeFactory>,
    retry: RetryPolicy,
    backoff: Arc<dyn Backoff>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(listeners: Arc<ListenerRegistry>, scopes: Arc<dyn ScopeFactory>) -> Self {
        Self {
            listeners,
            scopes,
            retry: RetryPolicy::default(),
            backoff: Arc::new(TokioBackoff),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Dispatch `events` and everything they cascade into.
    ///
    /// Listener failures are recorded, never returned. All listeners of one
    /// dispatch share a single execution scope, closed before returning.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        events: Vec<Arc<dyn DomainEvent>>,
    ) -> ExecutionRecord {
        let mut record = ExecutionRecord::default();
        if events.is_empty() {
            return record;
        }

        let guard = ScopeGuard::open(self.scopes.as_ref());
        let mut worklist = events;
        let mut next = 0;

        while next < worklist.len() {
            let event = Arc::clone(&worklist[next]);
            next += 1;

            for &slot in self.listeners.listeners_for(&*event) {
                let outcome = self.invoke(guard.scope(), ctx, &event, slot).await;
                let entry = DispatchEntry {
                    event_id: event.id(),
                    event_name: event.event_name(),
                    listener: slot.name(),
                    attempts: outcome.attempts,
                };
                match outcome.result {
                    Ok(raised) => {
                        tracing::debug!(
                            event = entry.event_name,
                            listener = entry.listener,
                            attempts = entry.attempts,
                            cascaded = raised.len(),
                            "listener executed"
                        );
                        metrics::counter!(
                            "courier_listener_executions_total",
                            "listener" => entry.listener,
                            "outcome" => "ok",
                        )
                        .increment(1);
                        worklist.extend(raised);
                        record.push_executed(entry);
                    }
                    Err(err) => {
                        tracing::error!(
                            event = entry.event_name,
                            event_id = %entry.event_id,
                            listener = entry.listener,
                            attempts = entry.attempts,
                            error = %err.last(),
                            "listener failed"
                        );
                        let cancelled = err.is_cancelled();
                        metrics::counter!(
                            "courier_listener_executions_total",
                            "listener" => entry.listener,
                            "outcome" => if cancelled { "cancelled" } else { "failed" },
                        )
                        .increment(1);
                        record.push_failed(DispatchFailure {
                            entry,
                            error: err.last().to_string(),
                            cancelled,
                        });
                    }
                }
            }
        }

        drop(guard);
        record
    }

    /// Run one listener with retries. Each attempt captures its own events;
    /// only the successful attempt's events are returned. A panic counts as a
    /// failed attempt.
    async fn invoke(
        &self,
        scope: &dyn ExecutionScope,
        ctx: &RequestContext,
        event: &Arc<dyn DomainEvent>,
        slot: ListenerSlot,
    ) -> RetryOutcome<Vec<Arc<dyn DomainEvent>>> {
        self.retry
            .run(ctx.cancellation(), self.backoff.as_ref(), move |attempt| async move {
                let span = debug_span!(
                    "listener",
                    listener = slot.name(),
                    event = event.event_name(),
                    attempt
                );
                let guarded = AssertUnwindSafe(slot.invoke(scope, ctx, event).instrument(span));
                let (result, raised) = capture::run_captured(guarded.catch_unwind()).await;
                match result {
                    Ok(Ok(())) => Ok(raised),
                    Ok(Err(err)) => Err(err),
                    Err(payload) => Err(anyhow::anyhow!(
                        "listener panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                }
            })
            .await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
