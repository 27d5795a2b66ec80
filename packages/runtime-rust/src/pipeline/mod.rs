//! Composable execution pipeline.
//!
//! 1. **Contracts** (`behavior`): `Behavior`, `Finalizer`, the `Next` continuation
//! 2. **Definition** (`builder`): ordered behavior slots + one finalizer, compiled once
//! 3. **Execution** (`executor`): opens a scope, runs the compiled chain, closes the scope

pub mod behavior;
pub mod builder;
pub mod executor;

pub use behavior::{Behavior, BehaviorSlot, BoxFuture, Finalizer, FinalizerSlot, Next};
pub use builder::{CompiledPipeline, PipelineBuilder, PipelineDefinition};
pub use executor::PipelineExecutor;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
