//! Sample integration events and handlers hosted by the node.

use eventbus_base::{async_trait, HandlerError, IntegrationEvent, IntegrationEventBase, IntegrationEventHandler};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Raised by the ordering service when an order is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderCreatedIntegrationEvent {
    #[serde(flatten)]
    base: IntegrationEventBase,
    pub order_id: i64,
    pub buyer: String,
}

impl OrderCreatedIntegrationEvent {
    pub fn new(order_id: i64, buyer: impl Into<String>) -> Self {
        Self {
            base: IntegrationEventBase::new(),
            order_id,
            buyer: buyer.into(),
        }
    }
}

impl IntegrationEvent for OrderCreatedIntegrationEvent {
    const TYPE_NAME: &'static str = "OrderCreatedIntegrationEvent";

    fn base(&self) -> &IntegrationEventBase {
        &self.base
    }
}

/// Logs every accepted order.
#[derive(Debug, Default)]
pub struct OrderCreatedHandler;

#[async_trait]
impl IntegrationEventHandler<OrderCreatedIntegrationEvent> for OrderCreatedHandler {
    async fn handle(&self, event: OrderCreatedIntegrationEvent) -> Result<(), HandlerError> {
        info!(
            event_id = %event.id(),
            order_id = event.order_id,
            buyer = %event.buyer,
            "Order created"
        );
        Ok(())
    }
}
