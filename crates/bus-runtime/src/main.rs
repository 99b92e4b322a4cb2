//! # Bus Runtime
//!
//! Starts an in-memory bus, submits a handful of orders, waits for them to
//! be processed and shuts down.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `BUS_*` variables and validate it
//! 2. Install logging (`BUS_LOG_LEVEL`)
//! 3. Build the container and the bus
//! 4. Start hosts, send orders, stop hosts

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use bus_core::Envelope;
use bus_runtime::orders::{SubmitOrder, ORDERS_QUEUE, TENANT_HEADER};
use bus_runtime::{build_bus, build_container, init_logging, OrderLedger, RuntimeConfig};

const DEMO_ORDERS: usize = 5;
const TENANTS: [&str; 2] = ["acme", "globex"];

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env();
    config.validate().context("invalid configuration")?;
    init_logging(&config.log_level).context("failed to initialize logging")?;

    info!(
        address = %config.transport.address,
        concurrency_limit = config.transport.concurrency_limit,
        scope_name = %config.scope_name,
        "Starting bus runtime"
    );

    let ledger = Arc::new(OrderLedger::default());
    let container = build_container(Arc::clone(&ledger));
    let bus = build_bus(&config, Arc::clone(&container)).context("failed to build bus")?;
    bus.start().await.context("failed to start bus")?;

    for n in 0..DEMO_ORDERS {
        let order = SubmitOrder {
            order_id: Uuid::new_v4(),
            sku: format!("sku-{n}"),
            quantity: 1,
        };
        let envelope = Envelope::from_message("SubmitOrder", &order)?
            .with_header(TENANT_HEADER, TENANTS[n % TENANTS.len()]);
        bus.send(ORDERS_QUEUE, envelope)?;
    }

    let deadline = tokio::time::Instant::now() + config.transport.drain_timeout;
    while ledger.notified().len() < DEMO_ORDERS {
        if tokio::time::Instant::now() >= deadline {
            warn!(notified = ledger.notified().len(), "Gave up waiting for orders");
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    bus.stop().await.context("failed to stop bus")?;
    info!(
        accepted = ledger.accepted().len(),
        notified = ledger.notified().len(),
        scopes_released = container.disposed(),
        "Bus runtime finished"
    );

    Ok(())
}
