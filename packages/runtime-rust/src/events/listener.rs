//! Event listeners and the per-event-type listener table.

use std::any::TypeId;
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use courier_core::{DomainEvent, RequestContext};

use crate::pipeline::BoxFuture;
use crate::scope::{resolve, ComponentId, ExecutionScope};

/// Reacts to one domain event type.
///
/// A listener may raise further events through [`crate::events::raise`];
/// they are dispatched after the current worklist only if this invocation
/// eventually succeeds.
#[async_trait]
pub trait Listener<E: DomainEvent>: Send + Sync + 'static {
    async fn handle(&self, ctx: &RequestContext, event: &E) -> anyhow::Result<()>;
}

type InvokeFn = for<'a> fn(
    &'a dyn ExecutionScope,
    &'a RequestContext,
    &'a Arc<dyn DomainEvent>,
) -> BoxFuture<'a, anyhow::Result<()>>;

/// A registered `(event type, listener)` pair.
///
/// Holds the listener's component id and a resolver that pulls the listener
/// from the dispatch scope and narrows the event to its concrete type.
#[derive(Clone, Copy)]
pub struct ListenerSlot {
    id: ComponentId,
    event: ComponentId,
    invoke: InvokeFn,
}

impl ListenerSlot {
    #[must_use]
    pub fn of<E: DomainEvent, L: Listener<E>>() -> Self {
        Self {
            id: ComponentId::of::<L>(),
            event: ComponentId::of::<E>(),
            invoke: invoke_listener::<E, L>,
        }
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    #[must_use]
    pub fn event(&self) -> ComponentId {
        self.event
    }

    pub(crate) fn invoke<'a>(
        &self,
        scope: &'a dyn ExecutionScope,
        ctx: &'a RequestContext,
        event: &'a Arc<dyn DomainEvent>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        (self.invoke)(scope, ctx, event)
    }
}

impl std::fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("listener", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

fn invoke_listener<'a, E: DomainEvent, L: Listener<E>>(
    scope: &'a dyn ExecutionScope,
    ctx: &'a RequestContext,
    event: &'a Arc<dyn DomainEvent>,
) -> BoxFuture<'a, anyhow::Result<()>> {
    Box::pin(async move {
        let listener = resolve::<L>(scope)?;
        let Some(event) = event.downcast_ref::<E>() else {
            anyhow::bail!(
                "listener {} cannot handle event {}",
                std::any::type_name::<L>(),
                event.event_name()
            );
        };
        listener.handle(ctx, event).await
    })
}

// ---------------------------------------------------------------------------
// ListenerRegistry
// ---------------------------------------------------------------------------

/// Immutable table of listeners per concrete event type, in registration order.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    by_event: AHashMap<TypeId, Vec<ListenerSlot>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn builder() -> ListenerRegistryBuilder {
        ListenerRegistryBuilder::default()
    }

    /// Listeners for the concrete type of `event`. Empty if none.
    #[must_use]
    pub fn listeners_for(&self, event: &dyn DomainEvent) -> &[ListenerSlot] {
        self.listeners_for_type(event.concrete_type())
    }

    #[must_use]
    pub fn listeners_for_type(&self, event: TypeId) -> &[ListenerSlot] {
        self.by_event.get(&event).map_or(&[], Vec::as_slice)
    }

    /// Total number of registered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ListenerRegistryBuilder {
    by_event: AHashMap<TypeId, Vec<ListenerSlot>>,
}

impl ListenerRegistryBuilder {
    /// Register `L` for events of type `E`. Registering the same pair twice has no effect.
    pub fn listener<E: DomainEvent, L: Listener<E>>(&mut self) -> &mut Self {
        self.push(ListenerSlot::of::<E, L>())
    }

    pub fn push(&mut self, slot: ListenerSlot) -> &mut Self {
        let slots = self.by_event.entry(slot.event.type_id()).or_default();
        if slots.iter().any(|s| s.id == slot.id) {
            tracing::debug!(
                listener = slot.name(),
                event = slot.event.name(),
                "duplicate listener ignored"
            );
        } else {
            slots.push(slot);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> ListenerRegistry {
        ListenerRegistry {
            by_event: self.by_event,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use courier_core::EventMetadata;
    use parking_lot::Mutex;

    use super::*;
    use crate::scope::{ComponentCatalog, ScopeGuard};

    #[derive(Debug)]
    struct Opened(EventMetadata);

    impl DomainEvent for Opened {
        fn metadata(&self) -> &EventMetadata {
            &self.0
        }
    }

    #[derive(Debug)]
    struct Closed(EventMetadata);

    impl DomainEvent for Closed {
        fn metadata(&self) -> &EventMetadata {
            &self.0
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<&'static str>>);

    struct First(Arc<Seen>);
    struct Second(Arc<Seen>);

    #[async_trait]
    impl Listener<Opened> for First {
        async fn handle(&self, _ctx: &RequestContext, _event: &Opened) -> anyhow::Result<()> {
            self.0 .0.lock().push("first");
            Ok(())
        }
    }

    #[async_trait]
    impl Listener<Opened> for Second {
        async fn handle(&self, _ctx: &RequestContext, _event: &Opened) -> anyhow::Result<()> {
            self.0 .0.lock().push("second");
            Ok(())
        }
    }

    #[test]
    fn lookup_is_by_concrete_type_in_registration_order() {
        let mut builder = ListenerRegistry::builder();
        builder.listener::<Opened, Second>().listener::<Opened, First>();
        let registry = builder.build();

        let opened: Arc<dyn DomainEvent> = Arc::new(Opened(EventMetadata::now()));
        let closed: Arc<dyn DomainEvent> = Arc::new(Closed(EventMetadata::now()));

        let ids: Vec<_> = registry
            .listeners_for(&*opened)
            .iter()
            .map(ListenerSlot::id)
            .collect();
        assert_eq!(ids, vec![ComponentId::of::<Second>(), ComponentId::of::<First>()]);
        assert!(registry.listeners_for(&*closed).is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_pairs_are_ignored() {
        let mut builder = ListenerRegistry::builder();
        builder.listener::<Opened, First>().listener::<Opened, First>();
        assert_eq!(builder.build().len(), 1);
    }

    #[tokio::test]
    async fn slot_resolves_listener_and_narrows_event() {
        let seen = Arc::new(Seen::default());
        let shared = Arc::clone(&seen);
        let mut catalog = ComponentCatalog::new();
        catalog.scoped(move |_| Ok(First(Arc::clone(&shared))));
        let factory = catalog.into_factory();
        let guard = ScopeGuard::open(&factory);

        let event: Arc<dyn DomainEvent> = Arc::new(Opened(EventMetadata::now()));
        let slot = ListenerSlot::of::<Opened, First>();
        slot.invoke(guard.scope(), &RequestContext::new(), &event)
            .await
            .unwrap();
        assert_eq!(*seen.0.lock(), vec!["first"]);

        let wrong: Arc<dyn DomainEvent> = Arc::new(Closed(EventMetadata::now()));
        assert!(slot
            .invoke(guard.scope(), &RequestContext::new(), &wrong)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unregistered_listener_fails_to_resolve() {
        let factory = ComponentCatalog::new().into_factory();
        let guard = ScopeGuard::open(&factory);
        let event: Arc<dyn DomainEvent> = Arc::new(Opened(EventMetadata::now()));
        let err = ListenerSlot::of::<Opened, Second>()
            .invoke(guard.scope(), &RequestContext::new(), &event)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }
}
