//! Fixtures shared by the in-crate test modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{Request, RequestContext, RequestKind, ValidationErrors};

use crate::error::CourierError;
use crate::handler::Handler;
use crate::pipeline::{PipelineDefinition, PipelineExecutor};
use crate::scope::ComponentCatalog;

/// Invocation counter registered as a shared instance.
#[derive(Default)]
pub(crate) struct Calls(AtomicUsize);

impl Calls {
    pub(crate) fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Query returning a formatted string for an id.
pub(crate) struct Lookup {
    pub id: u32,
    pub permission: Option<&'static str>,
    pub invalid: bool,
}

impl Lookup {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            permission: None,
            invalid: false,
        }
    }
}

impl Request for Lookup {
    type Response = String;
    const KIND: RequestKind = RequestKind::Query;

    fn name() -> &'static str {
        "Lookup"
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        if self.invalid {
            return Err(ValidationErrors::single("id", "must be valid"));
        }
        Ok(())
    }

    fn required_permission(&self) -> Option<&str> {
        self.permission
    }

    fn cache_key(&self) -> Option<String> {
        Some(format!("lookup:{}", self.id))
    }
}

/// Command that optionally sleeps and optionally fails.
pub(crate) struct Store {
    pub delay: Duration,
    pub fail: bool,
}

impl Request for Store {
    type Response = ();
    const KIND: RequestKind = RequestKind::Command;

    fn name() -> &'static str {
        "Store"
    }
}

pub(crate) struct LookupHandler {
    calls: Arc<Calls>,
}

#[async_trait]
impl Handler<Lookup> for LookupHandler {
    async fn handle(&self, _ctx: &RequestContext, request: Lookup) -> Result<String, CourierError> {
        self.calls.hit();
        Ok(format!("item-{}", request.id))
    }
}

pub(crate) struct StoreHandler {
    calls: Arc<Calls>,
}

#[async_trait]
impl Handler<Store> for StoreHandler {
    async fn handle(&self, _ctx: &RequestContext, request: Store) -> Result<(), CourierError> {
        self.calls.hit();
        if !request.delay.is_zero() {
            tokio::time::sleep(request.delay).await;
        }
        if request.fail {
            return Err(anyhow::anyhow!("store failed").into());
        }
        Ok(())
    }
}

/// Catalog holding both fixture handlers, each counting into `calls`.
pub(crate) fn fixture_catalog(calls: &Arc<Calls>) -> ComponentCatalog {
    let lookup_calls = Arc::clone(calls);
    let store_calls = Arc::clone(calls);
    let mut catalog = ComponentCatalog::new();
    catalog
        .scoped(move |_| {
            Ok(LookupHandler {
                calls: Arc::clone(&lookup_calls),
            })
        })
        .scoped(move |_| {
            Ok(StoreHandler {
                calls: Arc::clone(&store_calls),
            })
        });
    catalog
}

/// Compile `definition` and execute it once against a fresh factory over `catalog`.
pub(crate) async fn run_once<R: Request>(
    catalog: ComponentCatalog,
    definition: PipelineDefinition<RequestContext, R, R::Response>,
    ctx: &RequestContext,
    request: R,
) -> Result<R::Response, CourierError> {
    let executor = PipelineExecutor::new(
        Arc::new(definition.compile()),
        Arc::new(catalog.into_factory()),
    );
    executor.execute(ctx, request).await
}
