//! Standard cross-cutting behaviors.
//!
//! Every registered handler gets the enabled standard behaviors in this
//! order, outermost first:
//!
//! 1. `InstrumentBehavior`: span and request metrics
//! 2. `LoadShedBehavior`: rejects when the concurrency limit is reached
//! 3. `TimeoutBehavior`: deadline and cancellation
//! 4. `AuthorizationBehavior`: permission check
//! 5. `ValidationBehavior`: `Request::validate`
//! 6. `UnitOfWorkBehavior`: transaction around commands
//!
//! `CachingBehavior` is opt-in per query and goes after the standard stack.

pub mod authorization;
pub mod caching;
pub mod instrument;
pub mod load_shed;
pub mod timeout;
pub mod unit_of_work;
pub mod validation;

use std::sync::Arc;

pub use authorization::AuthorizationBehavior;
pub use caching::CachingBehavior;
use courier_core::{Authorizer, Request, RequestContext, RoleAuthorizer, UnitOfWorkFactory};
pub use instrument::InstrumentBehavior;
pub use load_shed::LoadShedBehavior;
pub use timeout::TimeoutBehavior;
pub use unit_of_work::UnitOfWorkBehavior;
pub use validation::ValidationBehavior;

use crate::config::{BehaviorConfig, CourierConfig};
use crate::error::CourierError;
use crate::pipeline::{BehaviorSlot, PipelineBuilder};
use crate::scope::{resolve, ComponentCatalog, ComponentId, ExecutionScope};

/// Append the enabled standard behaviors to `pipeline`, in stack order.
pub fn standard_stack<R: Request>(
    config: &BehaviorConfig,
    pipeline: &mut PipelineBuilder<RequestContext, R, R::Response>,
) {
    if config.instrument {
        pipeline.push(BehaviorSlot::of::<InstrumentBehavior>());
    }
    if config.load_shed {
        pipeline.push(BehaviorSlot::of::<LoadShedBehavior>());
    }
    if config.timeout {
        pipeline.push(BehaviorSlot::of::<TimeoutBehavior>());
    }
    if config.authorization {
        pipeline.push(BehaviorSlot::of::<AuthorizationBehavior>());
    }
    if config.validation {
        pipeline.push(BehaviorSlot::of::<ValidationBehavior>());
    }
    if config.unit_of_work {
        pipeline.push(BehaviorSlot::of::<UnitOfWorkBehavior>());
    }
}

/// Register the standard behaviors as singletons.
///
/// Components already present in `catalog` are left alone, so callers can
/// override any behavior or collaborator before calling this. The authorizer
/// defaults to [`RoleAuthorizer`]; without a registered
/// `Arc<dyn UnitOfWorkFactory>` the unit-of-work behavior passes through.
pub fn register_standard(catalog: &mut ComponentCatalog, config: &CourierConfig) {
    if !catalog.contains(ComponentId::of::<InstrumentBehavior>()) {
        catalog.instance(InstrumentBehavior);
    }
    if !catalog.contains(ComponentId::of::<LoadShedBehavior>()) {
        catalog.instance(LoadShedBehavior::new(config.max_concurrent_requests));
    }
    if !catalog.contains(ComponentId::of::<TimeoutBehavior>()) {
        catalog.instance(TimeoutBehavior::new(config.default_timeout()));
    }
    if !catalog.contains(ComponentId::of::<Arc<dyn Authorizer>>()) {
        catalog.instance::<Arc<dyn Authorizer>>(Arc::new(RoleAuthorizer));
    }
    if !catalog.contains(ComponentId::of::<AuthorizationBehavior>()) {
        catalog.singleton(|scope: &dyn ExecutionScope| {
            let authorizer = resolve::<Arc<dyn Authorizer>>(scope)?;
            Ok(AuthorizationBehavior::new(Arc::clone(&authorizer)))
        });
    }
    if !catalog.contains(ComponentId::of::<ValidationBehavior>()) {
        catalog.instance(ValidationBehavior);
    }
    if !catalog.contains(ComponentId::of::<UnitOfWorkBehavior>()) {
        catalog.singleton(|scope: &dyn ExecutionScope| {
            match resolve::<Arc<dyn UnitOfWorkFactory>>(scope) {
                Ok(factory) => Ok(UnitOfWorkBehavior::new(Arc::clone(&factory))),
                Err(CourierError::Unresolved { .. }) => Ok(UnitOfWorkBehavior::disabled()),
                Err(err) => Err(err),
            }
        });
    }
    if !catalog.contains(ComponentId::of::<CachingBehavior>()) {
        catalog.instance(CachingBehavior::new(config.cache_capacity));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
