//! Per-request record of listener executions.

use courier_core::{EventId, RequestContext};
use serde::Serialize;

/// One `(event, listener)` pair that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchEntry {
    pub event_id: EventId,
    pub event_name: &'static str,
    pub listener: &'static str,
    /// Attempts made, including the successful or final one.
    pub attempts: u32,
}

/// One `(event, listener)` pair that never succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    #[serde(flatten)]
    pub entry: DispatchEntry,
    pub error: String,
    /// The caller cancelled the request before the retry schedule ran out.
    pub cancelled: bool,
}

/// Which listeners ran for which events during one dispatch, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    executed: Vec<DispatchEntry>,
    failed: Vec<DispatchFailure>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn executed(&self) -> &[DispatchEntry] {
        &self.executed
    }

    #[must_use]
    pub fn failed(&self) -> &[DispatchFailure] {
        &self.failed
    }

    /// No listener failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// No listener ran at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.failed.is_empty()
    }

    /// Whether `listener` ran successfully for `event_id`.
    #[must_use]
    pub fn was_executed(&self, event_id: EventId, listener: &str) -> bool {
        self.executed
            .iter()
            .any(|e| e.event_id == event_id && e.listener == listener)
    }

    pub(crate) fn push_executed(&mut self, entry: DispatchEntry) {
        self.executed.push(entry);
    }

    pub(crate) fn push_failed(&mut self, failure: DispatchFailure) {
        self.failed.push(failure);
    }
}

// ---------------------------------------------------------------------------
// DispatchObserver
// ---------------------------------------------------------------------------

/// Notified once per successful request with its dispatch record.
///
/// Failed listeners are never reported back to the caller as errors; an
/// observer is where they get surfaced.
pub trait DispatchObserver: Send + Sync {
    fn on_dispatched(&self, ctx: &RequestContext, record: &ExecutionRecord);
}

/// Default observer: a summary line per request that dispatched anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl DispatchObserver for LoggingObserver {
    fn on_dispatched(&self, ctx: &RequestContext, record: &ExecutionRecord) {
        if record.is_empty() {
            return;
        }
        if record.is_clean() {
            tracing::debug!(
                correlation_id = %ctx.correlation_id,
                executed = record.executed().len(),
                "events dispatched"
            );
        } else {
            tracing::warn!(
                correlation_id = %ctx.correlation_id,
                executed = record.executed().len(),
                failed = record.failed().len(),
                "events dispatched with listener failures"
            );
        }
    }
}
