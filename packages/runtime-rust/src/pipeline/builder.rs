//! Pipeline definition and compilation.
//!
//! A [`PipelineDefinition`] is an ordered list of behavior slots plus one
//! finalizer slot. [`compile`](PipelineDefinition::compile) folds it from the
//! finalizer outward into a single delegate: the finalizer link is built
//! first, then each behavior, in reverse declared order, wraps the link built
//! before it. The result is built once and reused for every run; only the
//! instances resolved from each run's scope are per-run.

use std::sync::Arc;

use super::behavior::{
    Behavior, BehaviorSlot, BoxFuture, Finalizer, FinalizerSlot, Link, Next,
};
use crate::error::CourierError;
use crate::scope::{ComponentId, ExecutionScope};

// ---------------------------------------------------------------------------
// PipelineBuilder
// ---------------------------------------------------------------------------

/// Accumulates behaviors in invocation order; finished by naming the finalizer.
pub struct PipelineBuilder<C, I, O> {
    behaviors: Vec<BehaviorSlot<C, I, O>>,
}

impl<C, I, O> PipelineBuilder<C, I, O> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            behaviors: Vec::new(),
        }
    }

    /// Append a behavior. Behaviors run in the order they are added.
    #[must_use]
    pub fn behavior<B: Behavior<C, I, O>>(mut self) -> Self {
        self.behaviors.push(BehaviorSlot::of::<B>());
        self
    }

    /// Append an already-built slot.
    pub fn push(&mut self, slot: BehaviorSlot<C, I, O>) -> &mut Self {
        self.behaviors.push(slot);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Close the definition with its terminal handler.
    #[must_use]
    pub fn finalizer<F: Finalizer<C, I, O>>(self) -> PipelineDefinition<C, I, O> {
        PipelineDefinition {
            behaviors: self.behaviors,
            finalizer: FinalizerSlot::of::<F>(),
        }
    }
}

impl<C, I, O> Default for PipelineBuilder<C, I, O> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PipelineDefinition
// ---------------------------------------------------------------------------

/// Immutable shape of a pipeline for one `(Context, Input, Output)` triple.
pub struct PipelineDefinition<C, I, O> {
    behaviors: Vec<BehaviorSlot<C, I, O>>,
    finalizer: FinalizerSlot<C, I, O>,
}

impl<C, I, O> PipelineDefinition<C, I, O> {
    /// Behavior identifiers in invocation order.
    pub fn behaviors(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.behaviors.iter().map(BehaviorSlot::id)
    }

    #[must_use]
    pub fn finalizer(&self) -> ComponentId {
        self.finalizer.id()
    }
}

impl<C, I, O> PipelineDefinition<C, I, O>
where
    C: Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    /// Fold the definition into one reusable delegate.
    #[must_use]
    pub fn compile(self) -> CompiledPipeline<C, I, O> {
        let entry = self
            .behaviors
            .iter()
            .rev()
            .fold(terminal(self.finalizer), |inner, slot| wrap(*slot, inner));
        CompiledPipeline {
            definition: self,
            entry,
        }
    }
}

// ---------------------------------------------------------------------------
// CompiledPipeline
// ---------------------------------------------------------------------------

/// A compiled chain: `(scope, ctx, input) -> output`.
///
/// Immutable and shareable across concurrent runs without synchronization.
pub struct CompiledPipeline<C, I, O> {
    definition: PipelineDefinition<C, I, O>,
    entry: Link<C, I, O>,
}

impl<C, I, O> CompiledPipeline<C, I, O> {
    /// Run the chain against an already-open scope.
    ///
    /// The caller owns the scope; [`PipelineExecutor`](super::PipelineExecutor)
    /// is the entry point that also opens and closes it.
    pub fn run<'a>(
        &'a self,
        scope: &'a dyn ExecutionScope,
        ctx: &'a C,
        input: I,
    ) -> BoxFuture<'a, Result<O, CourierError>> {
        (self.entry)(scope, ctx, input)
    }

    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition<C, I, O> {
        &self.definition
    }
}

// ---------------------------------------------------------------------------
// Link construction
// ---------------------------------------------------------------------------

fn into_link<C, I, O, F>(f: F) -> Link<C, I, O>
where
    F: for<'a> Fn(&'a dyn ExecutionScope, &'a C, I) -> BoxFuture<'a, Result<O, CourierError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn terminal<C, I, O>(slot: FinalizerSlot<C, I, O>) -> Link<C, I, O>
where
    C: Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    into_link(move |scope, ctx, input| {
        Box::pin(async move {
            let finalizer = (slot.resolve)(scope)?;
            finalizer.handle(ctx, input).await
        })
    })
}

fn wrap<C, I, O>(slot: BehaviorSlot<C, I, O>, inner: Link<C, I, O>) -> Link<C, I, O>
where
    C: Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    into_link(move |scope, ctx, input| {
        let inner = Arc::clone(&inner);
        Box::pin(async move {
            let behavior = (slot.resolve)(scope)?;
            behavior.handle(ctx, input, Next::new(&inner, scope)).await
        })
    })
}
