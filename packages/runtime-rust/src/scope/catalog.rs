//! Reference scope factory backed by a table of component constructors.
//!
//! Enough container to run the pipeline standalone and in tests; production
//! deployments can supply their own [`ScopeFactory`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{AnyComponent, ComponentId, ExecutionScope, ScopeFactory};
use crate::error::CourierError;

type Constructor =
    Arc<dyn Fn(&dyn ExecutionScope) -> Result<AnyComponent, CourierError> + Send + Sync>;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the whole catalog, created on first resolution.
    Singleton,
    /// One instance per execution scope, released when the scope closes.
    Scoped,
    /// A fresh instance on every resolution.
    Transient,
}

struct Registration {
    lifetime: Lifetime,
    construct: Constructor,
}

// ---------------------------------------------------------------------------
// ComponentCatalog
// ---------------------------------------------------------------------------

/// Startup-built table of component constructors.
///
/// Constructors receive the resolving scope so they can pull their own
/// dependencies. A singleton must not depend on scoped components, or it
/// would keep the first scope's instance alive.
#[derive(Default)]
pub struct ComponentCatalog {
    registrations: AHashMap<ComponentId, Registration>,
    singletons: DashMap<ComponentId, AnyComponent>,
}

impl ComponentCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `T`. A later registration for the same type replaces it.
    pub fn register<T, F>(&mut self, lifetime: Lifetime, construct: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ExecutionScope) -> Result<T, CourierError> + Send + Sync + 'static,
    {
        let construct: Constructor = Arc::new(move |scope: &dyn ExecutionScope| {
            construct(scope).map(|c| Arc::new(c) as AnyComponent)
        });
        self.registrations
            .insert(ComponentId::of::<T>(), Registration { lifetime, construct });
        self
    }

    pub fn singleton<T, F>(&mut self, construct: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ExecutionScope) -> Result<T, CourierError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Singleton, construct)
    }

    pub fn scoped<T, F>(&mut self, construct: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ExecutionScope) -> Result<T, CourierError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Scoped, construct)
    }

    pub fn transient<T, F>(&mut self, construct: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn ExecutionScope) -> Result<T, CourierError> + Send + Sync + 'static,
    {
        self.register(Lifetime::Transient, construct)
    }

    /// Register an already-built shared instance.
    pub fn instance<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        let shared: AnyComponent = Arc::new(value);
        let construct: Constructor =
            Arc::new(move |_: &dyn ExecutionScope| Ok(Arc::clone(&shared)));
        self.registrations.insert(
            ComponentId::of::<T>(),
            Registration {
                lifetime: Lifetime::Singleton,
                construct,
            },
        );
        self
    }

    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.registrations.contains_key(&id)
    }

    #[must_use]
    pub fn lifetime_of(&self, id: ComponentId) -> Option<Lifetime> {
        self.registrations.get(&id).map(|r| r.lifetime)
    }

    /// Freeze the catalog and turn it into a scope factory.
    #[must_use]
    pub fn into_factory(self) -> CatalogScopeFactory {
        CatalogScopeFactory {
            catalog: Arc::new(self),
            next_scope_id: AtomicU64::new(1),
        }
    }
}

// ---------------------------------------------------------------------------
// CatalogScopeFactory
// ---------------------------------------------------------------------------

/// [`ScopeFactory`] over a frozen [`ComponentCatalog`].
pub struct CatalogScopeFactory {
    catalog: Arc<ComponentCatalog>,
    next_scope_id: AtomicU64,
}

impl CatalogScopeFactory {
    #[must_use]
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }
}

impl ScopeFactory for CatalogScopeFactory {
    fn open(&self) -> Box<dyn ExecutionScope> {
        let id = self.next_scope_id.fetch_add(1, Ordering::Relaxed);
        trace!(scope_id = id, "scope opened");
        Box::new(CatalogScope {
            id,
            catalog: Arc::clone(&self.catalog),
            instances: Mutex::new(AHashMap::new()),
            closed: AtomicBool::new(false),
        })
    }
}

// ---------------------------------------------------------------------------
// CatalogScope
// ---------------------------------------------------------------------------

struct CatalogScope {
    id: u64,
    catalog: Arc<ComponentCatalog>,
    instances: Mutex<AHashMap<ComponentId, AnyComponent>>,
    closed: AtomicBool,
}

impl ExecutionScope for CatalogScope {
    fn resolve_component(&self, id: ComponentId) -> Result<AnyComponent, CourierError> {
        if self.is_closed() {
            return Err(CourierError::ScopeClosed);
        }
        let scope: &dyn ExecutionScope = self;
        let registration = self
            .catalog
            .registrations
            .get(&id)
            .ok_or(CourierError::Unresolved { component: id.name() })?;

        // Constructors may resolve their own dependencies, so no lock is held
        // while one runs. A racing construction keeps whichever landed first.
        match registration.lifetime {
            Lifetime::Transient => (registration.construct)(scope),
            Lifetime::Scoped => {
                if let Some(existing) = self.instances.lock().get(&id) {
                    return Ok(Arc::clone(existing));
                }
                let created = (registration.construct)(scope)?;
                Ok(Arc::clone(self.instances.lock().entry(id).or_insert(created)))
            }
            Lifetime::Singleton => {
                if let Some(existing) = self.catalog.singletons.get(&id) {
                    return Ok(Arc::clone(existing.value()));
                }
                let created = (registration.construct)(scope)?;
                Ok(Arc::clone(
                    self.catalog.singletons.entry(id).or_insert(created).value(),
                ))
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = std::mem::take(&mut *self.instances.lock());
        debug!(scope_id = self.id, released = released.len(), "scope closed");
        drop(released);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for CatalogScope {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
