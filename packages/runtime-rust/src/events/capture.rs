//! Flow-local capture slot for raised domain events.
//!
//! Each logical request flow owns at most one slot. A slot is visible to the
//! flow that created it and to everything it awaits, but not to tasks it
//! spawns and not to concurrent flows. Nested scopes shadow the outer slot
//! without disturbing it, which is how listener invocations capture their
//! own cascaded events.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use courier_core::DomainEvent;

use crate::error::CourierError;

type Queue = Vec<Arc<dyn DomainEvent>>;

tokio::task_local! {
    static SLOT: RefCell<Option<Queue>>;
}

/// Run `fut` with a fresh, empty capture slot and return what it raised.
///
/// Events come back in the order they were raised. Any slot active outside
/// this call is untouched.
pub async fn run_captured<F: Future>(fut: F) -> (F::Output, Vec<Arc<dyn DomainEvent>>) {
    SLOT.scope(RefCell::new(Some(Vec::new())), async move {
        let output = fut.await;
        let events = capture().unwrap_or_default();
        (output, events)
    })
    .await
}

/// Run `fut` with flow-local storage but no active slot; call [`prepare`] to activate one.
pub async fn scoped<F: Future>(fut: F) -> F::Output {
    SLOT.scope(RefCell::new(None), fut).await
}

/// Start a new, empty slot for the current flow, replacing any existing one.
///
/// # Errors
///
/// `CaptureInactive` when called outside [`scoped`] or [`run_captured`].
pub fn prepare() -> Result<(), CourierError> {
    SLOT.try_with(|slot| {
        if let Some(dropped) = slot.borrow_mut().replace(Vec::new()) {
            if !dropped.is_empty() {
                tracing::warn!(
                    dropped = dropped.len(),
                    "capture slot replaced with events pending"
                );
            }
        }
    })
    .map_err(|_| CourierError::CaptureInactive)
}

/// Detach and return the current slot's events, leaving no active slot.
///
/// Returns `None` when no slot is active.
#[must_use]
pub fn capture() -> Option<Vec<Arc<dyn DomainEvent>>> {
    SLOT.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

/// Append an event to the current flow's slot.
///
/// # Errors
///
/// `CaptureInactive` when the current flow has no active slot. The event is
/// dropped.
pub fn raise<E: DomainEvent>(event: E) -> Result<(), CourierError> {
    raise_shared(Arc::new(event))
}

/// [`raise`] for an event that is already shared.
///
/// # Errors
///
/// `CaptureInactive` when the current flow has no active slot.
pub fn raise_shared(event: Arc<dyn DomainEvent>) -> Result<(), CourierError> {
    let pushed = SLOT
        .try_with(|slot| match slot.borrow_mut().as_mut() {
            Some(queue) => {
                queue.push(Arc::clone(&event));
                true
            }
            None => false,
        })
        .unwrap_or(false);

    if pushed {
        tracing::trace!(event = event.event_name(), id = %event.id(), "event raised");
        Ok(())
    } else {
        tracing::error!(
            event = event.event_name(),
            id = %event.id(),
            "event raised with no active capture slot"
        );
        Err(CourierError::CaptureInactive)
    }
}

/// Whether the current flow has an active slot.
#[must_use]
pub fn is_active() -> bool {
    SLOT.try_with(|slot| slot.borrow().is_some()).unwrap_or(false)
}

/// Number of events waiting in the current slot.
#[must_use]
pub fn pending() -> usize {
    SLOT.try_with(|slot| slot.borrow().as_ref().map_or(0, Vec::len))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
