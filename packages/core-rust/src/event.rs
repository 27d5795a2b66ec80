//! Domain event model.
//!
//! Events are immutable values raised by business logic as a side effect of
//! handling a request. They travel through the runtime as
//! `Arc<dyn DomainEvent>` and are narrowed back to their concrete type only
//! at the listener boundary.

use std::any::{Any, TypeId};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{ClockSource, SystemClock};

/// Unique identity of a single raised event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EventId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity and occurrence time carried by every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub id: EventId,
    /// Milliseconds since Unix epoch at which the event occurred.
    pub occurred_at_ms: u64,
}

impl EventMetadata {
    /// Stamps a new event identity using the given clock.
    #[must_use]
    pub fn new(clock: &dyn ClockSource) -> Self {
        Self {
            id: EventId::new(),
            occurred_at_ms: clock.now(),
        }
    }

    /// Stamps a new event identity using the system clock.
    #[must_use]
    pub fn now() -> Self {
        Self::new(&SystemClock)
    }
}

/// Object-safe access to `Any` for every sized `'static` type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An immutable record of a side effect produced while handling a request.
///
/// Listeners are registered per concrete event type; the runtime looks them
/// up with [`concrete_type`](trait.DomainEvent.html#method.concrete_type).
pub trait DomainEvent: AsAny + fmt::Debug + Send + Sync + 'static {
    fn metadata(&self) -> &EventMetadata;

    /// Human-readable name used in logs and execution records.
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn id(&self) -> EventId {
        self.metadata().id
    }
}

impl dyn DomainEvent {
    /// `TypeId` of the concrete event behind the trait object.
    #[must_use]
    pub fn concrete_type(&self) -> TypeId {
        Any::type_id(self.as_any())
    }

    /// Narrows the trait object to a concrete event type.
    #[must_use]
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    #[must_use]
    pub fn is<E: DomainEvent>(&self) -> bool {
        self.concrete_type() == TypeId::of::<E>()
    }
}
