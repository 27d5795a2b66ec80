// Demo: place a few orders and print each request's dispatch record as JSON.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use clap::Parser;
use courier_core::{
    DomainEvent, EventMetadata, Principal, Request, RequestContext, RequestKind, ValidationErrors,
};
use courier_runtime::events::raise;
use courier_runtime::{
    init_tracing, CourierConfig, CourierError, Handler, Listener, Mediator, TelemetryConfig,
};

#[derive(Parser, Debug)]
#[command(name = "courier-demo")]
#[command(about = "Send demo orders through the courier pipeline", long_about = None)]
struct Cli {
    /// Number of orders to place
    #[arg(short, long, default_value = "3")]
    orders: u32,

    /// Lines per order; each line raises one event
    #[arg(short, long, default_value = "2")]
    lines: u32,

    /// Times the ledger listener fails before succeeding
    #[arg(long, default_value = "2")]
    ledger_failures: u32,

    /// Divide every retry delay by 100
    #[arg(long)]
    fast_retry: bool,

    /// Request timeout in milliseconds
    #[arg(long, env = "COURIER_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "COURIER_LOG", default_value = "info")]
    log_filter: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "COURIER_JSON_LOGS")]
    json_logs: bool,
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct OrderLinePlaced {
    meta: EventMetadata,
    order: u32,
    line: u32,
}

impl DomainEvent for OrderLinePlaced {
    fn metadata(&self) -> &EventMetadata {
        &self.meta
    }

    fn event_name(&self) -> &'static str {
        "OrderLinePlaced"
    }
}

#[derive(Debug)]
struct StockReserved {
    meta: EventMetadata,
    order: u32,
}

impl DomainEvent for StockReserved {
    fn metadata(&self) -> &EventMetadata {
        &self.meta
    }

    fn event_name(&self) -> &'static str {
        "StockReserved"
    }
}

struct PlaceOrder {
    order: u32,
    lines: u32,
}

impl Request for PlaceOrder {
    type Response = u32;
    const KIND: RequestKind = RequestKind::Command;

    fn name() -> &'static str {
        "PlaceOrder"
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.lines == 0 {
            errors.push("lines", "an order needs at least one line");
        }
        errors.into_result()
    }

    fn required_permission(&self) -> Option<&str> {
        Some("orders:write")
    }
}

struct PlaceOrderHandler;

#[async_trait]
impl Handler<PlaceOrder> for PlaceOrderHandler {
    async fn handle(
        &self,
        _ctx: &RequestContext,
        request: PlaceOrder,
    ) -> Result<u32, CourierError> {
        for line in 0..request.lines {
            raise(OrderLinePlaced {
                meta: EventMetadata::now(),
                order: request.order,
                line,
            })?;
        }
        Ok(request.lines)
    }
}

struct Inventory;

#[async_trait]
impl Listener<OrderLinePlaced> for Inventory {
    async fn handle(&self, _ctx: &RequestContext, event: &OrderLinePlaced) -> anyhow::Result<()> {
        tracing::info!(order = event.order, line = event.line, "stock reserved");
        if event.line == 0 {
            raise(StockReserved {
                meta: EventMetadata::now(),
                order: event.order,
            })?;
        }
        Ok(())
    }
}

struct Ledger {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Listener<OrderLinePlaced> for Ledger {
    async fn handle(&self, _ctx: &RequestContext, event: &OrderLinePlaced) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("ledger unavailable (call {})", call + 1);
        }
        tracing::info!(order = event.order, line = event.line, "ledger entry written");
        Ok(())
    }
}

struct Shipping;

#[async_trait]
impl Listener<StockReserved> for Shipping {
    async fn handle(&self, _ctx: &RequestContext, event: &StockReserved) -> anyhow::Result<()> {
        tracing::info!(order = event.order, "shipment scheduled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CourierConfig {
        default_timeout_ms: cli.timeout_ms,
        telemetry: TelemetryConfig {
            filter: cli.log_filter.clone(),
            json: cli.json_logs,
        },
        ..CourierConfig::default()
    };
    if cli.fast_retry {
        for delay in &mut config.retry_delays_ms {
            *delay /= 100;
        }
    }
    init_tracing(&config.telemetry)?;

    let failures = cli.ledger_failures;
    let mediator = Mediator::builder(config)
        .handler::<PlaceOrder, PlaceOrderHandler>(|_| Ok(PlaceOrderHandler))
        .listener::<OrderLinePlaced, Inventory>(|_| Ok(Inventory))
        .listener::<OrderLinePlaced, Ledger>(move |_| {
            Ok(Ledger {
                failures,
                calls: AtomicU32::new(0),
            })
        })
        .listener::<StockReserved, Shipping>(|_| Ok(Shipping))
        .build();

    let clerk = Principal::new("clerk-1", ["orders:write"]);
    for order in 1..=cli.orders {
        let ctx = RequestContext::new().with_principal(clerk.clone());
        let request = PlaceOrder {
            order,
            lines: cli.lines,
        };
        match mediator.send_with_record(&ctx, request).await {
            Ok((lines, record)) => {
                tracing::info!(order, lines, correlation_id = %ctx.correlation_id, "order placed");
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Err(err) => {
                tracing::error!(order, kind = err.kind().as_str(), error = %err, "order rejected");
            }
        }
    }

    Ok(())
}
