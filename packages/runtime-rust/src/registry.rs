//! Startup-built mapping from request type to compiled pipeline.
//!
//! Handler candidates are collected by [`RegistryBuilder`]; at build time a
//! request type with exactly one candidate is registered and every other
//! request type is left out. A mismatch is never a runtime error: the
//! request type is simply absent and sending it yields `NoHandler`.

use std::any::{Any, TypeId};
use std::sync::Arc;

use ahash::AHashMap;
use courier_core::{DomainEvent, Request, RequestContext, RequestKind};

use crate::behaviors::{standard_stack, CachingBehavior};
use crate::config::BehaviorConfig;
use crate::events::{Listener, ListenerRegistry, ListenerRegistryBuilder};
use crate::handler::Handler;
use crate::pipeline::{BehaviorSlot, CompiledPipeline, PipelineBuilder};
use crate::scope::ComponentId;

type RequestPipeline<R> = CompiledPipeline<RequestContext, R, <R as Request>::Response>;

// ---------------------------------------------------------------------------
// RegistryEntry
// ---------------------------------------------------------------------------

/// Registered shape of one request type.
pub struct RegistryEntry {
    request: &'static str,
    kind: RequestKind,
    response: &'static str,
    behaviors: Vec<ComponentId>,
    finalizer: ComponentId,
    pipeline: Arc<dyn Any + Send + Sync>,
}

impl RegistryEntry {
    fn new<R: Request>(pipeline: RequestPipeline<R>) -> Self {
        let definition = pipeline.definition();
        Self {
            request: R::name(),
            kind: R::KIND,
            response: std::any::type_name::<R::Response>(),
            behaviors: definition.behaviors().collect(),
            finalizer: definition.finalizer(),
            pipeline: Arc::new(pipeline),
        }
    }

    #[must_use]
    pub fn request(&self) -> &'static str {
        self.request
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    #[must_use]
    pub fn response(&self) -> &'static str {
        self.response
    }

    /// Behavior identifiers in invocation order.
    #[must_use]
    pub fn behaviors(&self) -> &[ComponentId] {
        &self.behaviors
    }

    #[must_use]
    pub fn finalizer(&self) -> ComponentId {
        self.finalizer
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("request", &self.request)
            .field("kind", &self.kind)
            .field("behaviors", &self.behaviors)
            .field("finalizer", &self.finalizer)
            .finish_non_exhaustive()
    }
}

/// A request type left out of the registry, with the handlers that were offered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub request: &'static str,
    pub handlers: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// ObjectRegistry
// ---------------------------------------------------------------------------

/// Read-only request registry. Safe for concurrent lookups.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    entries: AHashMap<TypeId, RegistryEntry>,
    excluded: Vec<Exclusion>,
}

impl ObjectRegistry {
    #[must_use]
    pub fn lookup(&self, request: TypeId) -> Option<&RegistryEntry> {
        self.entries.get(&request)
    }

    #[must_use]
    pub fn lookup_of<R: Request>(&self) -> Option<&RegistryEntry> {
        self.lookup(TypeId::of::<R>())
    }

    /// The compiled pipeline for `R`, if `R` is registered.
    #[must_use]
    pub fn pipeline<R: Request>(&self) -> Option<Arc<RequestPipeline<R>>> {
        let erased = Arc::clone(&self.lookup_of::<R>()?.pipeline);
        erased.downcast::<RequestPipeline<R>>().ok()
    }

    #[must_use]
    pub fn contains<R: Request>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<R>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    /// Request types left out at build time.
    #[must_use]
    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

struct Candidate {
    handler: ComponentId,
    entry: RegistryEntry,
}

struct Requested {
    name: &'static str,
    candidates: Vec<Candidate>,
}

/// Collects handler candidates and listener registrations at startup.
pub struct RegistryBuilder {
    behaviors: BehaviorConfig,
    requests: AHashMap<TypeId, Requested>,
    order: Vec<TypeId>,
    listeners: ListenerRegistryBuilder,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new(behaviors: BehaviorConfig) -> Self {
        Self {
            behaviors,
            requests: AHashMap::new(),
            order: Vec::new(),
            listeners: ListenerRegistryBuilder::default(),
        }
    }

    /// Make `R` known without offering a handler. It stays unregistered
    /// unless a handler is added later.
    pub fn declare<R: Request>(&mut self) -> &mut Self {
        self.requested::<R>();
        self
    }

    /// Offer `H` as the handler for `R`, behind the standard behaviors.
    pub fn handler<R: Request, H: Handler<R>>(&mut self) -> &mut Self {
        self.handler_with::<R, H, _>(|_| {})
    }

    /// Like [`handler`](Self::handler), with a hook to append behaviors after
    /// the standard stack.
    pub fn handler_with<R, H, F>(&mut self, customize: F) -> &mut Self
    where
        R: Request,
        H: Handler<R>,
        F: FnOnce(&mut PipelineBuilder<RequestContext, R, R::Response>),
    {
        let mut pipeline = PipelineBuilder::new();
        standard_stack::<R>(&self.behaviors, &mut pipeline);
        customize(&mut pipeline);
        let entry = RegistryEntry::new::<R>(pipeline.finalizer::<H>().compile());

        let handler = ComponentId::of::<H>();
        let requested = self.requested::<R>();
        if requested.candidates.iter().any(|c| c.handler == handler) {
            tracing::debug!(request = R::name(), handler = %handler, "handler offered twice");
        } else {
            requested.candidates.push(Candidate { handler, entry });
        }
        self
    }

    /// Offer `H` for `R` with response caching after the standard stack.
    pub fn cached_handler<R, H>(&mut self) -> &mut Self
    where
        R: Request,
        R::Response: Clone + Sync,
        H: Handler<R>,
    {
        self.handler_with::<R, H, _>(|pipeline| {
            pipeline.push(BehaviorSlot::of::<CachingBehavior>());
        })
    }

    pub fn listener<E: DomainEvent, L: Listener<E>>(&mut self) -> &mut Self {
        self.listeners.listener::<E, L>();
        self
    }

    fn requested<R: Request>(&mut self) -> &mut Requested {
        let order = &mut self.order;
        self.requests.entry(TypeId::of::<R>()).or_insert_with(|| {
            order.push(TypeId::of::<R>());
            Requested {
                name: R::name(),
                candidates: Vec::new(),
            }
        })
    }

    #[must_use]
    pub fn build(self) -> (ObjectRegistry, ListenerRegistry) {
        let mut requests = self.requests;
        let mut registry = ObjectRegistry::default();

        for type_id in self.order {
            let Some(mut requested) = requests.remove(&type_id) else {
                continue;
            };
            if requested.candidates.len() == 1 {
                if let Some(candidate) = requested.candidates.pop() {
                    tracing::debug!(
                        request = requested.name,
                        handler = %candidate.handler,
                        behaviors = candidate.entry.behaviors.len(),
                        "request registered"
                    );
                    registry.entries.insert(type_id, candidate.entry);
                }
            } else {
                let handlers: Vec<_> = requested
                    .candidates
                    .iter()
                    .map(|c| c.handler.name())
                    .collect();
                tracing::debug!(
                    request = requested.name,
                    candidates = handlers.len(),
                    ?handlers,
                    "request excluded: needs exactly one handler"
                );
                registry.excluded.push(Exclusion {
                    request: requested.name,
                    handlers,
                });
            }
        }

        (registry, self.listeners.build())
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new(BehaviorConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
