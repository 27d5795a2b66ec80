//! Courier Runtime — execution scopes, request pipelines, domain event
//! capture and dispatch, and the `Mediator` facade tying them together.

pub mod behaviors;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod mediator;
pub mod pipeline;
pub mod registry;
pub mod scope;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BehaviorConfig, CourierConfig};
pub use error::{CourierError, ErrorKind};
pub use events::{raise, DispatchObserver, ExecutionRecord, Listener, RetryPolicy};
pub use handler::Handler;
pub use mediator::{Mediator, MediatorBuilder, RequestService};
pub use pipeline::{Behavior, Finalizer, Next, PipelineBuilder, PipelineExecutor};
pub use registry::{ObjectRegistry, RegistryBuilder, RegistryEntry};
pub use scope::{ComponentCatalog, ComponentId, ExecutionScope, Lifetime, ScopeFactory};
pub use telemetry::{init_tracing, TelemetryConfig};
