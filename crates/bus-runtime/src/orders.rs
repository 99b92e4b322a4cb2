//! # Order Processing
//!
//! The runtime's bus: an `orders` queue accepting `SubmitOrder`, which
//! publishes `OrderAccepted` to the `notifications` queue. Each message
//! runs in its own scope carrying a [`RequestContext`] built from the
//! envelope's `tenant` header.

use std::sync::Arc;

use bus_core::{
    handler_fn, has_errors, Bus, ConfigurationError, ConsumeContext, Envelope, HandlerError,
    InMemoryBusConfigurator, ScopeId, ScopeRegistrations, ServiceContainer,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RuntimeConfig;

pub const ORDERS_QUEUE: &str = "orders";
pub const NOTIFICATIONS_QUEUE: &str = "notifications";

/// Header naming the tenant a message belongs to.
pub const TENANT_HEADER: &str = "tenant";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub order_id: Uuid,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: Uuid,
}

/// Per-message values registered into each scope.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub scope_id: ScopeId,
    pub tenant: String,
}

/// Shared record of processed orders.
#[derive(Debug, Default)]
pub struct OrderLedger {
    accepted: Mutex<Vec<(String, Uuid)>>,
    notified: Mutex<Vec<Uuid>>,
}

impl OrderLedger {
    /// Accepted orders as `(tenant, order id)`, in processing order.
    pub fn accepted(&self) -> Vec<(String, Uuid)> {
        self.accepted.lock().clone()
    }

    pub fn notified(&self) -> Vec<Uuid> {
        self.notified.lock().clone()
    }
}

/// Container with `ledger` registered as a singleton.
pub fn build_container(ledger: Arc<OrderLedger>) -> Arc<ServiceContainer> {
    let container = Arc::new(ServiceContainer::new());
    container.register_shared(ledger);
    container
}

/// Configure, validate and build the order bus.
pub fn build_bus(
    config: &RuntimeConfig,
    container: Arc<ServiceContainer>,
) -> Result<Bus, ConfigurationError> {
    let mut bus = InMemoryBusConfigurator::with_transport_config(config.transport.clone());
    bus.use_message_scope(container)?;
    bus.set_scope_name(config.scope_name.clone())?;
    bus.set_scope_configuration_hook(
        |registrations: &mut ScopeRegistrations, envelope: &Envelope| {
            let tenant = envelope.header(TENANT_HEADER).unwrap_or("default").to_string();
            let scope_id = registrations.scope_id();
            registrations.insert(RequestContext { scope_id, tenant });
        },
    )?;
    bus.add_send_filter(Arc::new(|envelope: &mut Envelope| {
        envelope
            .headers
            .entry("sent-by".to_string())
            .or_insert_with(|| env!("CARGO_PKG_NAME").to_string());
    }))?;

    bus.receive_endpoint(ORDERS_QUEUE, |endpoint| {
        endpoint.handler("SubmitOrder", handler_fn(submit_order));
    })?;
    bus.receive_endpoint(NOTIFICATIONS_QUEUE, |endpoint| {
        endpoint.handler("OrderAccepted", handler_fn(order_accepted));
    })?;

    let results = bus.validate();
    if has_errors(&results) {
        return Err(ConfigurationError::Invalid(results));
    }
    for warning in &results {
        warn!(source = %warning.source(), "{}", warning.message());
    }

    bus.build()
}

fn missing(context: &ConsumeContext, what: &str) -> HandlerError {
    HandlerError::new(context.message_type(), format!("{what} is not available in scope"))
}

async fn submit_order(context: ConsumeContext) -> Result<(), HandlerError> {
    let order: SubmitOrder = context.decode()?;
    if order.quantity == 0 {
        return Err(HandlerError::new(
            context.message_type(),
            "quantity must be greater than zero",
        ));
    }

    let ledger = context
        .resolve::<OrderLedger>()
        .ok_or_else(|| missing(&context, "OrderLedger"))?;
    let request = context
        .resolve::<RequestContext>()
        .ok_or_else(|| missing(&context, "RequestContext"))?;

    ledger
        .accepted
        .lock()
        .push((request.tenant.clone(), order.order_id));
    info!(
        order_id = %order.order_id,
        sku = %order.sku,
        tenant = %request.tenant,
        scope = %request.scope_id,
        "Order accepted"
    );

    let accepted = serde_json::to_value(OrderAccepted {
        order_id: order.order_id,
    })
    .map_err(|e| HandlerError::new(context.message_type(), e.to_string()))?;
    let follow_up = context
        .envelope()
        .follow_up("OrderAccepted", accepted)
        .with_header(TENANT_HEADER, request.tenant.clone());
    context
        .publish(follow_up)
        .map_err(|e| HandlerError::new(context.message_type(), e.to_string()))?;
    Ok(())
}

async fn order_accepted(context: ConsumeContext) -> Result<(), HandlerError> {
    let accepted: OrderAccepted = context.decode()?;
    let ledger = context
        .resolve::<OrderLedger>()
        .ok_or_else(|| missing(&context, "OrderLedger"))?;
    ledger.notified.lock().push(accepted.order_id);
    info!(order_id = %accepted.order_id, "Order notification sent");
    Ok(())
}
