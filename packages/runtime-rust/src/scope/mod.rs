//! Per-run resolution scopes.
//!
//! Every pipeline run and every event dispatch opens exactly one
//! [`ExecutionScope`] through a [`ScopeFactory`]. Behaviors, the handler and
//! listeners are resolved from it by [`ComponentId`], and everything the scope
//! resolved is released when it closes. [`ScopeGuard`] ties the close to
//! `Drop`, so no exit path (error, short-circuit, panic, dropped future) can
//! skip it.

pub mod catalog;

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::CourierError;

pub use catalog::{CatalogScopeFactory, ComponentCatalog, Lifetime};

/// A resolved component, type-erased.
pub type AnyComponent = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Identifier of a resolvable component: its `TypeId` plus the type name for
/// diagnostics. Equality and hashing use the `TypeId` only.
#[derive(Clone, Copy)]
pub struct ComponentId {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentId {
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentId {}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// ExecutionScope / ScopeFactory
// ---------------------------------------------------------------------------

/// Resource-lifetime boundary for one pipeline run or one event dispatch.
///
/// Never shared across concurrent runs.
pub trait ExecutionScope: Send + Sync {
    /// Resolve a component by id.
    ///
    /// # Errors
    ///
    /// `Unresolved` if nothing is registered under `id`, `ScopeClosed` after
    /// `close()`, or whatever the component's construction returned.
    fn resolve_component(&self, id: ComponentId) -> Result<AnyComponent, CourierError>;

    /// Release every instance this scope owns. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens execution scopes. Implemented by the surrounding container.
pub trait ScopeFactory: Send + Sync {
    fn open(&self) -> Box<dyn ExecutionScope>;
}

/// Resolve a component by its concrete type.
///
/// # Errors
///
/// Propagates the scope's resolution error, or `Unresolved` if the registered
/// instance is not a `T`.
pub fn resolve<T: Send + Sync + 'static>(
    scope: &dyn ExecutionScope,
) -> Result<Arc<T>, CourierError> {
    let id = ComponentId::of::<T>();
    scope
        .resolve_component(id)?
        .downcast::<T>()
        .map_err(|_| CourierError::Unresolved { component: id.name() })
}

// ---------------------------------------------------------------------------
// ScopeGuard
// ---------------------------------------------------------------------------

/// RAII owner of an open scope. Closes it when dropped.
pub struct ScopeGuard {
    scope: Box<dyn ExecutionScope>,
}

impl ScopeGuard {
    #[must_use]
    pub fn open(factory: &dyn ScopeFactory) -> Self {
        Self {
            scope: factory.open(),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &dyn ExecutionScope {
        self.scope.as_ref()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.scope.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
