//! Shared test fixtures: events, handlers and bus builders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventbus_base::{
    EventBusConfig, EventBusConfigBuilder, HandlerContainer, HandlerError, IntegrationEvent,
    IntegrationEventBase, IntegrationEventHandler,
};
use eventbus_servicebus::{ExceptionContext, InMemoryServiceBus, RetryPolicy, ServiceBusEventBus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const TOPIC: &str = "EventBusTopic";

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderCreatedIntegrationEvent {
    #[serde(flatten)]
    pub base: IntegrationEventBase,
    pub order_id: i64,
}

impl OrderCreatedIntegrationEvent {
    pub fn new(order_id: i64) -> Self {
        Self {
            base: IntegrationEventBase::new(),
            order_id,
        }
    }
}

impl IntegrationEvent for OrderCreatedIntegrationEvent {
    const TYPE_NAME: &'static str = "OrderCreatedIntegrationEvent";

    fn base(&self) -> &IntegrationEventBase {
        &self.base
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentSucceededIntegrationEvent {
    #[serde(flatten)]
    pub base: IntegrationEventBase,
    pub order_id: i64,
}

impl PaymentSucceededIntegrationEvent {
    pub fn new(order_id: i64) -> Self {
        Self {
            base: IntegrationEventBase::new(),
            order_id,
        }
    }
}

impl IntegrationEvent for PaymentSucceededIntegrationEvent {
    const TYPE_NAME: &'static str = "PaymentSucceededIntegrationEvent";

    fn base(&self) -> &IntegrationEventBase {
        &self.base
    }
}

/// Character-set suffix trimming over-trims this name to `Notific`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationIntegrationEvent {
    #[serde(flatten)]
    pub base: IntegrationEventBase,
    pub text: String,
}

impl IntegrationEvent for NotificationIntegrationEvent {
    const TYPE_NAME: &'static str = "NotificationIntegrationEvent";

    fn base(&self) -> &IntegrationEventBase {
        &self.base
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Records `"{tag}:{order_id}"` per order.
pub struct RecordingOrderHandler {
    pub tag: &'static str,
    pub journal: Journal,
}

#[async_trait]
impl IntegrationEventHandler<OrderCreatedIntegrationEvent> for RecordingOrderHandler {
    async fn handle(&self, event: OrderCreatedIntegrationEvent) -> Result<(), HandlerError> {
        self.journal
            .lock()
            .push(format!("{}:{}", self.tag, event.order_id));
        Ok(())
    }
}

pub struct RecordingPaymentHandler(pub Journal);

#[async_trait]
impl IntegrationEventHandler<PaymentSucceededIntegrationEvent> for RecordingPaymentHandler {
    async fn handle(&self, event: PaymentSucceededIntegrationEvent) -> Result<(), HandlerError> {
        self.0.lock().push(format!("paid:{}", event.order_id));
        Ok(())
    }
}

pub struct RecordingNotificationHandler(pub Journal);

#[async_trait]
impl IntegrationEventHandler<NotificationIntegrationEvent> for RecordingNotificationHandler {
    async fn handle(&self, event: NotificationIntegrationEvent) -> Result<(), HandlerError> {
        self.0.lock().push(event.text);
        Ok(())
    }
}

// =============================================================================
// BUS BUILDERS
// =============================================================================

/// Config for app `app` with a short receive wait.
pub fn config_builder(app: &str) -> EventBusConfigBuilder {
    EventBusConfig::builder()
        .connection_string("Endpoint=sb://integration-tests/")
        .subscriber_client_app_name(app)
        .receive_wait(Duration::from_millis(20))
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3).with_backoff(Duration::from_millis(1), Duration::from_millis(4))
}

pub type Reports = Arc<Mutex<Vec<ExceptionContext>>>;

/// Connect a bus for `config` on `broker`, collecting exception reports.
pub async fn connect(
    broker: &Arc<InMemoryServiceBus>,
    config: EventBusConfig,
    container: Arc<HandlerContainer>,
) -> (ServiceBusEventBus, Reports) {
    let reports = Reports::default();
    let sink = Arc::clone(&reports);
    let bus = ServiceBusEventBus::builder(Arc::new(config), container)
        .broker(Arc::clone(broker))
        .retry_policy(fast_retry())
        .on_exception(move |ctx| sink.lock().push(ctx.clone()))
        .connect()
        .await
        .expect("bus connects");
    (bus, reports)
}

/// Poll `check` until it holds, panicking after five seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}
