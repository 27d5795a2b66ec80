//! Behavior and finalizer contracts, and the continuation handed to behaviors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CourierError;
use crate::scope::{resolve, ComponentId, ExecutionScope};

/// Boxed, sendable future used at the type-erased seams of the pipeline.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One compiled link of a chain: resolves its component from the scope and runs it.
pub(crate) type Link<C, I, O> = Arc<
    dyn for<'a> Fn(&'a dyn ExecutionScope, &'a C, I) -> BoxFuture<'a, Result<O, CourierError>>
        + Send
        + Sync,
>;

// ---------------------------------------------------------------------------
// Behavior / Finalizer
// ---------------------------------------------------------------------------

/// A link in the execution chain.
///
/// A behavior may transform the input before passing it on, inspect or
/// replace the output, or short-circuit by returning without running `next`.
/// Instances are resolved per scope; keep per-run state in the instance and
/// shared state behind an `Arc`.
#[async_trait]
pub trait Behavior<C, I, O>: Send + Sync + 'static {
    async fn handle(&self, ctx: &C, input: I, next: Next<'_, C, I, O>) -> Result<O, CourierError>;
}

/// Terminal link of the chain: the actual request handler.
#[async_trait]
pub trait Finalizer<C, I, O>: Send + Sync + 'static {
    async fn handle(&self, ctx: &C, input: I) -> Result<O, CourierError>;
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// Continuation to the rest of the chain.
///
/// Consumed by [`run`](Self::run), so a behavior can invoke the remainder of
/// the chain at most once.
pub struct Next<'a, C, I, O> {
    link: &'a Link<C, I, O>,
    scope: &'a dyn ExecutionScope,
}

impl<'a, C, I, O> Next<'a, C, I, O> {
    pub(crate) fn new(link: &'a Link<C, I, O>, scope: &'a dyn ExecutionScope) -> Self {
        Self { link, scope }
    }

    /// Run every downstream behavior and the finalizer with `input`.
    pub fn run(self, ctx: &'a C, input: I) -> BoxFuture<'a, Result<O, CourierError>> {
        (self.link)(self.scope, ctx, input)
    }

    /// The scope of the current run, for behaviors that resolve collaborators lazily.
    #[must_use]
    pub fn scope(&self) -> &'a dyn ExecutionScope {
        self.scope
    }
}

// ---------------------------------------------------------------------------
// Slots (type-erased resolvers)
// ---------------------------------------------------------------------------

type ResolveBehavior<C, I, O> =
    fn(&dyn ExecutionScope) -> Result<Arc<dyn Behavior<C, I, O>>, CourierError>;

type ResolveFinalizer<C, I, O> =
    fn(&dyn ExecutionScope) -> Result<Arc<dyn Finalizer<C, I, O>>, CourierError>;

/// Identifier of a behavior plus the resolver that narrows the scope's
/// type-erased instance back to `dyn Behavior`. Built once at startup.
pub struct BehaviorSlot<C, I, O> {
    id: ComponentId,
    pub(crate) resolve: ResolveBehavior<C, I, O>,
}

impl<C, I, O> BehaviorSlot<C, I, O> {
    #[must_use]
    pub fn of<B: Behavior<C, I, O>>() -> Self {
        Self {
            id: ComponentId::of::<B>(),
            resolve: resolve_behavior::<C, I, O, B>,
        }
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }
}

impl<C, I, O> Clone for BehaviorSlot<C, I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, I, O> Copy for BehaviorSlot<C, I, O> {}

/// Finalizer counterpart of [`BehaviorSlot`].
pub struct FinalizerSlot<C, I, O> {
    id: ComponentId,
    pub(crate) resolve: ResolveFinalizer<C, I, O>,
}

impl<C, I, O> FinalizerSlot<C, I, O> {
    #[must_use]
    pub fn of<F: Finalizer<C, I, O>>() -> Self {
        Self {
            id: ComponentId::of::<F>(),
            resolve: resolve_finalizer::<C, I, O, F>,
        }
    }

    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }
}

impl<C, I, O> Clone for FinalizerSlot<C, I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, I, O> Copy for FinalizerSlot<C, I, O> {}

fn resolve_behavior<C, I, O, B: Behavior<C, I, O>>(
    scope: &dyn ExecutionScope,
) -> Result<Arc<dyn Behavior<C, I, O>>, CourierError> {
    let behavior: Arc<B> = resolve(scope)?;
    Ok(behavior)
}

fn resolve_finalizer<C, I, O, F: Finalizer<C, I, O>>(
    scope: &dyn ExecutionScope,
) -> Result<Arc<dyn Finalizer<C, I, O>>, CourierError> {
    let finalizer: Arc<F> = resolve(scope)?;
    Ok(finalizer)
}
