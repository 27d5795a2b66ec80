//! Opt-in response cache for queries.
//!
//! Keyed by request type, tenant and [`Request::cache_key`], so one tenant is
//! never served another's response. Only successful query responses are
//! stored; commands and keyless requests pass through.

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{Request, RequestContext, RequestKind};
use quick_cache::sync::Cache;

use crate::error::CourierError;
use crate::pipeline::{Behavior, Next};

type CacheKey = (TypeId, Option<String>, String);
type CachedResponse = Arc<dyn Any + Send + Sync>;

/// Shared bounded cache. Register as a singleton and add it to the pipelines
/// of the queries that should be cached, after authorization.
#[derive(Clone)]
pub struct CachingBehavior {
    cache: Arc<Cache<CacheKey, CachedResponse>>,
}

impl CachingBehavior {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(Cache::new(capacity.max(1))),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the cached response of `R` under `key` for `tenant`. Returns
    /// whether one was present.
    pub fn invalidate<R: Request>(&self, tenant: Option<&str>, key: &str) -> bool {
        self.cache
            .remove(&(TypeId::of::<R>(), tenant.map(str::to_owned), key.to_owned()))
            .is_some()
    }
}

#[async_trait]
impl<R> Behavior<RequestContext, R, R::Response> for CachingBehavior
where
    R: Request,
    R::Response: Clone + Sync,
{
    async fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        next: Next<'_, RequestContext, R, R::Response>,
    ) -> Result<R::Response, CourierError> {
        let key = match request.cache_key() {
            Some(key) if R::KIND == RequestKind::Query => {
                (TypeId::of::<R>(), ctx.tenant_id.clone(), key)
            }
            _ => return next.run(ctx, request).await,
        };

        if let Some(hit) = self.cache.get(&key) {
            if let Some(response) = hit.downcast_ref::<R::Response>() {
                tracing::trace!(request = R::name(), key = %key.2, "cache hit");
                return Ok(response.clone());
            }
        }

        let response = next.run(ctx, request).await?;
        self.cache.insert(key, Arc::new(response.clone()));
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::handler::Handler;
    use crate::pipeline::{PipelineBuilder, PipelineExecutor};
    use crate::scope::ComponentCatalog;
    use crate::testing::{fixture_catalog, Calls, Lookup, LookupHandler, Store, StoreHandler};

    /// Query whose answer depends only on the caller's tenant.
    struct TenantName;

    impl Request for TenantName {
        type Response = String;
        const KIND: RequestKind = RequestKind::Query;

        fn cache_key(&self) -> Option<String> {
            Some("tenant-name".into())
        }
    }

    struct TenantNameHandler;

    #[async_trait]
    impl Handler<TenantName> for TenantNameHandler {
        async fn handle(
            &self,
            ctx: &RequestContext,
            _request: TenantName,
        ) -> Result<String, CourierError> {
            Ok(ctx.tenant_id.clone().unwrap_or_default())
        }
    }

    fn lookup_executor(
        cache: &CachingBehavior,
        calls: &Arc<Calls>,
    ) -> PipelineExecutor<RequestContext, Lookup, String> {
        let mut catalog = fixture_catalog(calls);
        catalog.instance(cache.clone());
        let definition = PipelineBuilder::<RequestContext, Lookup, String>::new()
            .behavior::<CachingBehavior>()
            .finalizer::<LookupHandler>();
        PipelineExecutor::new(
            Arc::new(definition.compile()),
            Arc::new(catalog.into_factory()),
        )
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let cache = CachingBehavior::new(16);
        let calls = Arc::new(Calls::default());
        let exec = lookup_executor(&cache, &calls);
        let ctx = RequestContext::new();

        assert_eq!(exec.execute(&ctx, Lookup::new(1)).await.unwrap(), "item-1");
        assert_eq!(exec.execute(&ctx, Lookup::new(1)).await.unwrap(), "item-1");
        assert_eq!(calls.count(), 1);

        assert_eq!(exec.execute(&ctx, Lookup::new(2)).await.unwrap(), "item-2");
        assert_eq!(calls.count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_run() {
        let cache = CachingBehavior::new(16);
        let calls = Arc::new(Calls::default());
        let exec = lookup_executor(&cache, &calls);
        let ctx = RequestContext::new();

        exec.execute(&ctx, Lookup::new(5)).await.unwrap();
        assert!(!cache.invalidate::<Lookup>(Some("acme"), "lookup:5"));
        assert!(cache.invalidate::<Lookup>(None, "lookup:5"));
        exec.execute(&ctx, Lookup::new(5)).await.unwrap();
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn commands_are_never_cached() {
        let cache = CachingBehavior::new(16);
        let calls = Arc::new(Calls::default());
        let mut catalog = fixture_catalog(&calls);
        catalog.instance(cache.clone());
        let definition = PipelineBuilder::<RequestContext, Store, ()>::new()
            .behavior::<CachingBehavior>()
            .finalizer::<StoreHandler>();
        let exec = PipelineExecutor::new(
            Arc::new(definition.compile()),
            Arc::new(catalog.into_factory()),
        );
        let store = || Store {
            delay: Duration::ZERO,
            fail: false,
        };

        exec.execute(&RequestContext::new(), store()).await.unwrap();
        exec.execute(&RequestContext::new(), store()).await.unwrap();
        assert_eq!(calls.count(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn tenants_do_not_share_cached_responses() {
        let cache = CachingBehavior::new(16);
        let mut catalog = ComponentCatalog::new();
        catalog.instance(cache.clone()).instance(TenantNameHandler);
        let definition = PipelineBuilder::<RequestContext, TenantName, String>::new()
            .behavior::<CachingBehavior>()
            .finalizer::<TenantNameHandler>();
        let exec = PipelineExecutor::new(
            Arc::new(definition.compile()),
            Arc::new(catalog.into_factory()),
        );
        let tenant_a = RequestContext::new().with_tenant("A");
        let tenant_b = RequestContext::new().with_tenant("B");

        assert_eq!(exec.execute(&tenant_a, TenantName).await.unwrap(), "A");
        assert_eq!(exec.execute(&tenant_b, TenantName).await.unwrap(), "B");
        assert_eq!(exec.execute(&tenant_a, TenantName).await.unwrap(), "A");
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate::<TenantName>(Some("B"), "tenant-name"));
        assert_eq!(cache.len(), 1);
    }
}
