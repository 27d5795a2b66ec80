//! Scope-owning entry point for running a compiled pipeline.

use std::sync::Arc;

use tracing::{debug_span, Instrument};

use super::builder::CompiledPipeline;
use crate::error::CourierError;
use crate::scope::{ScopeFactory, ScopeGuard};

/// Runs a compiled pipeline inside a freshly opened execution scope.
///
/// The scope is closed on every exit path: success, short-circuit, error,
/// or the returned future being dropped before completion.
pub struct PipelineExecutor<C, I, O> {
    pipeline: Arc<CompiledPipeline<C, I, O>>,
    scopes: Arc<dyn ScopeFactory>,
}

impl<C, I, O> Clone for PipelineExecutor<C, I, O> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            scopes: Arc::clone(&self.scopes),
        }
    }
}

impl<C, I, O> PipelineExecutor<C, I, O>
where
    C: Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    #[must_use]
    pub fn new(pipeline: Arc<CompiledPipeline<C, I, O>>, scopes: Arc<dyn ScopeFactory>) -> Self {
        Self { pipeline, scopes }
    }

    /// Execute the pipeline once.
    ///
    /// # Errors
    ///
    /// Returns whatever a behavior or the finalizer returned, unchanged, or a
    /// resolution error if a component could not be resolved from the scope.
    pub async fn execute(&self, ctx: &C, input: I) -> Result<O, CourierError> {
        let span = debug_span!(
            "pipeline.execute",
            finalizer = self.pipeline.definition().finalizer().name(),
            behaviors = self.pipeline.definition().behaviors().count(),
        );
        async {
            let guard = ScopeGuard::open(self.scopes.as_ref());
            let result = self.pipeline.run(guard.scope(), ctx, input).await;
            drop(guard);
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_core::RequestContext;
    use futures_util::FutureExt;

    use super::*;
    use crate::handler::Handler;
    use crate::pipeline::PipelineBuilder;
    use crate::scope::ComponentCatalog;
    use crate::testing::Store;

    /// Counts how many times the owning scope released it.
    struct Released(Arc<AtomicUsize>);

    impl Drop for Released {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Scoped handler that either sleeps for the requested delay or panics.
    struct Parked {
        _released: Released,
        crash: bool,
    }

    #[async_trait]
    impl Handler<Store> for Parked {
        async fn handle(&self, _ctx: &RequestContext, request: Store) -> Result<(), CourierError> {
            assert!(!self.crash, "handler crashed");
            tokio::time::sleep(request.delay).await;
            Ok(())
        }
    }

    fn executor(
        released: &Arc<AtomicUsize>,
        crash: bool,
    ) -> PipelineExecutor<RequestContext, Store, ()> {
        let counter = Arc::clone(released);
        let mut catalog = ComponentCatalog::new();
        catalog.scoped(move |_| {
            Ok(Parked {
                _released: Released(Arc::clone(&counter)),
                crash,
            })
        });
        let definition = PipelineBuilder::<RequestContext, Store, ()>::new().finalizer::<Parked>();
        PipelineExecutor::new(
            Arc::new(definition.compile()),
            Arc::new(catalog.into_factory()),
        )
    }

    fn store(delay: Duration) -> Store {
        Store { delay, fail: false }
    }

    #[tokio::test]
    async fn scope_is_released_after_a_completed_run() {
        let released = Arc::new(AtomicUsize::new(0));
        let exec = executor(&released, false);

        exec.execute(&RequestContext::new(), store(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scope_is_released_when_the_run_future_is_dropped() {
        let released = Arc::new(AtomicUsize::new(0));
        let exec = executor(&released, false);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            exec.execute(&RequestContext::new(), store(Duration::from_secs(10))),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scope_is_released_when_the_run_task_is_aborted() {
        let released = Arc::new(AtomicUsize::new(0));
        let exec = executor(&released, false);

        let task = tokio::spawn(async move {
            exec.execute(&RequestContext::new(), store(Duration::from_secs(10)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(released.load(Ordering::SeqCst), 0);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scope_is_released_when_the_handler_panics() {
        let released = Arc::new(AtomicUsize::new(0));
        let exec = executor(&released, true);

        let outcome = AssertUnwindSafe(exec.execute(&RequestContext::new(), store(Duration::ZERO)))
            .catch_unwind()
            .await;
        assert!(outcome.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
