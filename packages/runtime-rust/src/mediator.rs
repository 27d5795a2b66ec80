//! Request entry point: lookup, pipeline run, capture, dispatch.

use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use courier_core::{Authorizer, DomainEvent, Request, RequestContext, UnitOfWorkFactory};
use tower::Service;

use crate::behaviors::register_standard;
use crate::config::CourierConfig;
use crate::error::CourierError;
use crate::events::{
    capture, Backoff, DispatchObserver, EventDispatcher, ExecutionRecord, Listener,
    ListenerRegistry, LoggingObserver, TokioBackoff,
};
use crate::handler::Handler;
use crate::pipeline::{BoxFuture, PipelineExecutor};
use crate::registry::{ObjectRegistry, RegistryBuilder};
use crate::scope::{ComponentCatalog, ExecutionScope, Lifetime, ScopeFactory};

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// Routes typed requests to their pipelines and dispatches the events a
/// successful run raised.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Mediator {
    registry: Arc<ObjectRegistry>,
    scopes: Arc<dyn ScopeFactory>,
    dispatcher: EventDispatcher,
    observer: Arc<dyn DispatchObserver>,
}

impl Mediator {
    #[must_use]
    pub fn builder(config: CourierConfig) -> MediatorBuilder {
        MediatorBuilder::new(config)
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        self.dispatcher.listeners()
    }

    /// Run `request` through its pipeline and dispatch the events it raised.
    ///
    /// # Errors
    ///
    /// `NoHandler` if `R` is not registered; otherwise whatever the pipeline
    /// returned. Listener failures are never returned here.
    pub async fn send<R: Request>(
        &self,
        ctx: &RequestContext,
        request: R,
    ) -> Result<R::Response, CourierError> {
        self.send_with_record(ctx, request)
            .await
            .map(|(response, _)| response)
    }

    /// [`send`](Self::send), also returning the dispatch record.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_with_record<R: Request>(
        &self,
        ctx: &RequestContext,
        request: R,
    ) -> Result<(R::Response, ExecutionRecord), CourierError> {
        let Some(pipeline) = self.registry.pipeline::<R>() else {
            tracing::debug!(request = R::name(), "no handler registered");
            return Err(CourierError::NoHandler { request: R::name() });
        };
        let executor = PipelineExecutor::new(pipeline, Arc::clone(&self.scopes));

        let (result, events) = capture::run_captured(executor.execute(ctx, request)).await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                if !events.is_empty() {
                    tracing::debug!(
                        request = R::name(),
                        discarded = events.len(),
                        "request failed, captured events discarded"
                    );
                }
                return Err(err);
            }
        };

        let record = self.dispatcher.dispatch(ctx, events).await;
        self.observer.on_dispatched(ctx, &record);
        Ok((response, record))
    }

    /// A `tower::Service` sending `R` through this mediator, for transport layers.
    #[must_use]
    pub fn service<R: Request>(self: &Arc<Self>) -> RequestService<R> {
        RequestService {
            mediator: Arc::clone(self),
            _request: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// RequestService
// ---------------------------------------------------------------------------

/// Tower adapter over [`Mediator::send`]. Always ready; load shedding
/// happens inside the pipeline.
pub struct RequestService<R> {
    mediator: Arc<Mediator>,
    _request: PhantomData<fn(R)>,
}

impl<R> Clone for RequestService<R> {
    fn clone(&self) -> Self {
        Self {
            mediator: Arc::clone(&self.mediator),
            _request: PhantomData,
        }
    }
}

impl<R: Request> Service<(RequestContext, R)> for RequestService<R> {
    type Response = R::Response;
    type Error = CourierError;
    type Future = BoxFuture<'static, Result<R::Response, CourierError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, (ctx, request): (RequestContext, R)) -> Self::Future {
        let mediator = Arc::clone(&self.mediator);
        Box::pin(async move { mediator.send(&ctx, request).await })
    }
}

// ---------------------------------------------------------------------------
// MediatorBuilder
// ---------------------------------------------------------------------------

/// Wires handlers, listeners and collaborators into a [`Mediator`].
///
/// Handlers and listeners registered here go both into the registry and,
/// with their constructor, into the builder's [`ComponentCatalog`].
pub struct MediatorBuilder {
    config: CourierConfig,
    catalog: ComponentCatalog,
    registry: RegistryBuilder,
    scopes: Option<Arc<dyn ScopeFactory>>,
    backoff: Arc<dyn Backoff>,
    observer: Arc<dyn DispatchObserver>,
}

impl MediatorBuilder {
    #[must_use]
    pub fn new(config: CourierConfig) -> Self {
        Self {
            registry: RegistryBuilder::new(config.behaviors),
            config,
            catalog: ComponentCatalog::new(),
            scopes: None,
            backoff: Arc::new(TokioBackoff),
            observer: Arc::new(LoggingObserver),
        }
    }

    /// Register `H` as the handler for `R`, constructed once per scope.
    #[must_use]
    pub fn handler<R: Request, H: Handler<R>>(
        mut self,
        construct: impl Fn(&dyn ExecutionScope) -> Result<H, CourierError> + Send + Sync + 'static,
    ) -> Self {
        self.catalog.scoped(construct);
        self.registry.handler::<R, H>();
        self
    }

    /// Register `H` for `R` with response caching.
    #[must_use]
    pub fn cached_handler<R, H>(
        mut self,
        construct: impl Fn(&dyn ExecutionScope) -> Result<H, CourierError> + Send + Sync + 'static,
    ) -> Self
    where
        R: Request,
        R::Response: Clone + Sync,
        H: Handler<R>,
    {
        self.catalog.scoped(construct);
        self.registry.cached_handler::<R, H>();
        self
    }

    /// Register `L` for events of type `E`, constructed once per dispatch.
    #[must_use]
    pub fn listener<E: DomainEvent, L: Listener<E>>(
        mut self,
        construct: impl Fn(&dyn ExecutionScope) -> Result<L, CourierError> + Send + Sync + 'static,
    ) -> Self {
        self.catalog.scoped(construct);
        self.registry.listener::<E, L>();
        self
    }

    /// Register any other component handlers or listeners depend on.
    #[must_use]
    pub fn component<T: Send + Sync + 'static>(
        mut self,
        lifetime: Lifetime,
        construct: impl Fn(&dyn ExecutionScope) -> Result<T, CourierError> + Send + Sync + 'static,
    ) -> Self {
        self.catalog.register(lifetime, construct);
        self
    }

    #[must_use]
    pub fn instance<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.catalog.instance(value);
        self
    }

    #[must_use]
    pub fn authorizer(self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.instance(authorizer)
    }

    #[must_use]
    pub fn unit_of_work(self, factory: Arc<dyn UnitOfWorkFactory>) -> Self {
        self.instance(factory)
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Resolve components from an external container instead of the
    /// builder's catalog. The container must provide every handler,
    /// listener and enabled standard behavior.
    #[must_use]
    pub fn scope_factory(mut self, scopes: Arc<dyn ScopeFactory>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn catalog_mut(&mut self) -> &mut ComponentCatalog {
        &mut self.catalog
    }

    pub fn registry_mut(&mut self) -> &mut RegistryBuilder {
        &mut self.registry
    }

    #[must_use]
    pub fn build(self) -> Mediator {
        let Self {
            config,
            mut catalog,
            registry,
            scopes,
            backoff,
            observer,
        } = self;

        let scopes: Arc<dyn ScopeFactory> = match scopes {
            Some(scopes) => scopes,
            None => {
                register_standard(&mut catalog, &config);
                Arc::new(catalog.into_factory())
            }
        };
        let (registry, listeners) = registry.build();
        tracing::info!(
            requests = registry.len(),
            excluded = registry.excluded().len(),
            listeners = listeners.len(),
            "mediator built"
        );

        let dispatcher = EventDispatcher::new(Arc::new(listeners), Arc::clone(&scopes))
            .with_retry(config.retry_policy())
            .with_backoff(backoff);

        Mediator {
            registry: Arc::new(registry),
            scopes,
            dispatcher,
            observer,
        }
    }
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new(CourierConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_core::{EventId, EventMetadata, RequestKind};
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::events::raise;

    #[derive(Default)]
    struct Trace(Mutex<Vec<String>>);

    impl Trace {
        fn push(&self, entry: String) {
            self.0.lock().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    #[derive(Debug)]
    struct OrderPlaced {
        meta: EventMetadata,
        order: u32,
        line: u32,
    }

    impl DomainEvent for OrderPlaced {
        fn metadata(&self) -> &EventMetadata {
            &self.meta
        }
    }

    #[derive(Debug)]
    struct InvoiceIssued {
        meta: EventMetadata,
        order: u32,
    }

    impl DomainEvent for InvoiceIssued {
        fn metadata(&self) -> &EventMetadata {
            &self.meta
        }
    }

    /// Raises `lines` `OrderPlaced` events, then fails if asked to.
    struct PlaceOrder {
        order: u32,
        lines: u32,
        fail: bool,
    }

    impl PlaceOrder {
        fn new(order: u32, lines: u32) -> Self {
            Self {
                order,
                lines,
                fail: false,
            }
        }
    }

    impl Request for PlaceOrder {
        type Response = Vec<EventId>;
        const KIND: RequestKind = RequestKind::Command;
    }

    struct PlaceOrderHandler;

    #[async_trait]
    impl Handler<PlaceOrder> for PlaceOrderHandler {
        async fn handle(
            &self,
            _ctx: &RequestContext,
            request: PlaceOrder,
        ) -> Result<Vec<EventId>, CourierError> {
            let mut raised = Vec::new();
            for line in 0..request.lines {
                let event = OrderPlaced {
                    meta: EventMetadata::now(),
                    order: request.order,
                    line,
                };
                raised.push(event.id());
                raise(event)?;
                tokio::task::yield_now().await;
            }
            if request.fail {
                return Err(anyhow::anyhow!("payment declined").into());
            }
            Ok(raised)
        }
    }

    /// Never registered with a handler.
    struct CancelOrder;

    impl Request for CancelOrder {
        type Response = ();
        const KIND: RequestKind = RequestKind::Command;
    }

    struct Warehouse(Arc<Trace>);

    #[async_trait]
    impl Listener<OrderPlaced> for Warehouse {
        async fn handle(&self, _ctx: &RequestContext, event: &OrderPlaced) -> anyhow::Result<()> {
            self.0.push(format!("warehouse:{}.{}", event.order, event.line));
            Ok(())
        }
    }

    struct Billing(Arc<Trace>);

    #[async_trait]
    impl Listener<OrderPlaced> for Billing {
        async fn handle(&self, _ctx: &RequestContext, event: &OrderPlaced) -> anyhow::Result<()> {
            self.0.push(format!("billing:{}.{}", event.order, event.line));
            if event.line == 0 {
                raise(InvoiceIssued {
                    meta: EventMetadata::now(),
                    order: event.order,
                })?;
            }
            Ok(())
        }
    }

    struct Mailer(Arc<Trace>);

    #[async_trait]
    impl Listener<InvoiceIssued> for Mailer {
        async fn handle(&self, _ctx: &RequestContext, event: &InvoiceIssued) -> anyhow::Result<()> {
            self.0.push(format!("mailer:{}", event.order));
            Ok(())
        }
    }

    /// Fails its first three calls.
    struct Ledger {
        trace: Arc<Trace>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Listener<OrderPlaced> for Ledger {
        async fn handle(&self, _ctx: &RequestContext, event: &OrderPlaced) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.trace.push(format!("ledger:{}#{call}", event.order));
            if call <= 3 {
                anyhow::bail!("ledger unavailable");
            }
            Ok(())
        }
    }

    /// Panics on every call.
    struct Crashing;

    #[async_trait]
    impl Listener<OrderPlaced> for Crashing {
        async fn handle(&self, _ctx: &RequestContext, event: &OrderPlaced) -> anyhow::Result<()> {
            let reserved: Vec<u32> = Vec::new();
            let slot = usize::try_from(event.line + 3)?;
            anyhow::ensure!(reserved[slot] > 0, "nothing reserved");
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingObserver(Mutex<Vec<ExecutionRecord>>);

    impl DispatchObserver for CollectingObserver {
        fn on_dispatched(&self, _ctx: &RequestContext, record: &ExecutionRecord) {
            self.0.lock().push(record.clone());
        }
    }

    fn builder(trace: &Arc<Trace>) -> MediatorBuilder {
        let (w, b, m) = (Arc::clone(trace), Arc::clone(trace), Arc::clone(trace));
        Mediator::builder(CourierConfig::default())
            .handler::<PlaceOrder, PlaceOrderHandler>(|_| Ok(PlaceOrderHandler))
            .listener::<OrderPlaced, Warehouse>(move |_| Ok(Warehouse(Arc::clone(&w))))
            .listener::<OrderPlaced, Billing>(move |_| Ok(Billing(Arc::clone(&b))))
            .listener::<InvoiceIssued, Mailer>(move |_| Ok(Mailer(Arc::clone(&m))))
    }

    #[tokio::test]
    async fn dispatches_captured_events_in_raised_order() {
        let trace = Arc::new(Trace::default());
        let mediator = builder(&trace).build();

        let (ids, record) = mediator
            .send_with_record(&RequestContext::new(), PlaceOrder::new(1, 2))
            .await
            .unwrap();

        assert_eq!(
            trace.entries(),
            vec![
                "warehouse:1.0",
                "billing:1.0",
                "warehouse:1.1",
                "billing:1.1",
                "mailer:1",
            ]
        );
        let first_seen: Vec<EventId> = record
            .executed()
            .iter()
            .map(|e| e.event_id)
            .filter(|id| ids.contains(id))
            .fold(Vec::new(), |mut seen, id| {
                if !seen.contains(&id) {
                    seen.push(id);
                }
                seen
            });
        assert_eq!(first_seen, ids);
        assert_eq!(record.executed().len(), 5);
        assert!(record.is_clean());
    }

    #[tokio::test]
    async fn failed_request_dispatches_nothing() {
        let trace = Arc::new(Trace::default());
        let observer = Arc::new(CollectingObserver::default());
        let mediator = builder(&trace).observer(observer.clone()).build();

        let request = PlaceOrder {
            fail: true,
            ..PlaceOrder::new(2, 3)
        };
        let err = mediator
            .send(&RequestContext::new(), request)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "payment declined");
        assert!(trace.entries().is_empty());
        assert!(observer.0.lock().is_empty());
    }

    #[tokio::test]
    async fn unregistered_request_is_not_found() {
        let mediator = builder(&Arc::new(Trace::default())).build();
        let err = mediator
            .send(&RequestContext::new(), CancelOrder)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NoHandler { .. }));
    }

    #[tokio::test]
    async fn duplicate_handlers_leave_request_unregistered() {
        struct AltHandler;

        #[async_trait]
        impl Handler<PlaceOrder> for AltHandler {
            async fn handle(
                &self,
                _ctx: &RequestContext,
                _request: PlaceOrder,
            ) -> Result<Vec<EventId>, CourierError> {
                Ok(Vec::new())
            }
        }

        let mediator = builder(&Arc::new(Trace::default()))
            .handler::<PlaceOrder, AltHandler>(|_| Ok(AltHandler))
            .build();
        assert!(!mediator.registry().contains::<PlaceOrder>());
        let err = mediator
            .send(&RequestContext::new(), PlaceOrder::new(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NoHandler { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_never_share_captured_events() {
        let trace = Arc::new(Trace::default());
        let mediator = Arc::new(builder(&trace).build());

        let tasks: Vec<_> = (0..32u32)
            .map(|order| {
                let mediator = Arc::clone(&mediator);
                tokio::spawn(async move {
                    let ctx = RequestContext::new();
                    let (ids, record) = mediator
                        .send_with_record(&ctx, PlaceOrder::new(order, 3))
                        .await
                        .unwrap();
                    (ids, record)
                })
            })
            .collect();

        for task in tasks {
            let (ids, record) = task.await.unwrap();
            assert_eq!(ids.len(), 3);
            // Two OrderPlaced listeners per line, plus one Mailer for the invoice.
            assert_eq!(record.executed().len(), 7);
            for entry in record.executed() {
                if entry.event_name.ends_with("OrderPlaced") {
                    assert!(ids.contains(&entry.event_id));
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_listener_is_retried_on_backoff_schedule() {
        let trace = Arc::new(Trace::default());
        let ledger_trace = Arc::clone(&trace);
        let mediator = Mediator::builder(CourierConfig::default())
            .handler::<PlaceOrder, PlaceOrderHandler>(|_| Ok(PlaceOrderHandler))
            .listener::<OrderPlaced, Ledger>(move |_| {
                Ok(Ledger {
                    trace: Arc::clone(&ledger_trace),
                    calls: AtomicU32::new(0),
                })
            })
            .build();

        let start = tokio::time::Instant::now();
        let (_, record) = mediator
            .send_with_record(&RequestContext::new(), PlaceOrder::new(7, 1))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(1_400));
        assert!(record.is_clean());
        assert_eq!(record.executed()[0].attempts, 4);
        assert_eq!(trace.entries().len(), 4);
    }

    #[tokio::test]
    async fn observer_sees_each_successful_dispatch() {
        let trace = Arc::new(Trace::default());
        let observer = Arc::new(CollectingObserver::default());
        let mediator = builder(&trace).observer(observer.clone()).build();

        mediator
            .send(&RequestContext::new(), PlaceOrder::new(3, 1))
            .await
            .unwrap();
        mediator
            .send(&RequestContext::new(), PlaceOrder::new(4, 0))
            .await
            .unwrap();

        let records = observer.0.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].executed().len(), 3);
        assert!(records[1].is_empty());
    }

    #[tokio::test]
    async fn tower_service_sends_through_the_mediator() {
        let trace = Arc::new(Trace::default());
        let mediator = Arc::new(builder(&trace).build());

        let ids = mediator
            .service::<PlaceOrder>()
            .oneshot((RequestContext::new(), PlaceOrder::new(9, 1)))
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(trace.entries().len(), 3);
    }

    #[tokio::test]
    async fn standard_behaviors_apply_to_registered_handlers() {
        let trace = Arc::new(Trace::default());
        let mediator = builder(&trace).build();

        let ctx = RequestContext::new();
        ctx.cancel();
        let err = mediator
            .send(&ctx, PlaceOrder::new(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Cancelled));
        assert!(trace.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_listener_does_not_lose_the_response() {
        let trace = Arc::new(Trace::default());
        let mediator = builder(&trace)
            .listener::<OrderPlaced, Crashing>(|_| Ok(Crashing))
            .build();

        let (ids, record) = mediator
            .send_with_record(&RequestContext::new(), PlaceOrder::new(7, 1))
            .await
            .unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(
            trace.entries(),
            vec!["warehouse:7.0", "billing:7.0", "mailer:7"]
        );
        assert_eq!(record.failed().len(), 1);
        assert_eq!(record.failed()[0].entry.attempts, 6);
        assert!(record.failed()[0].error.contains("listener panicked"));
    }
}
