//! # Event Bus Node
//!
//! Runnable host for the integration event bus.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging + metrics)
//! 2. Load bus configuration from `EVENTBUS_*` variables
//! 3. Register handlers in the container
//! 4. Connect the Service Bus transport and subscribe
//! 5. Publish a sample event
//! 6. Wait for Ctrl+C, then dispose the bus
//!
//! Without `EVENTBUS_CONNECTION_STRING` the node falls back to a local
//! development configuration; the broker is always the in-memory one.

mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use eventbus_base::{EventBus, EventBusConfig, EventBusError, HandlerContainer};
use eventbus_servicebus::{InMemoryServiceBus, ServiceBusEventBus};
use eventbus_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

use crate::handlers::{OrderCreatedHandler, OrderCreatedIntegrationEvent};

const DEV_CONNECTION_STRING: &str = "Endpoint=sb://localhost/;SharedAccessKeyName=dev";
const DEV_APP_NAME: &str = "EventBusNode";

/// Host owning the bus and its collaborators.
pub struct NodeRuntime {
    bus: ServiceBusEventBus,
}

impl NodeRuntime {
    /// Wire the container and transport, then connect.
    pub async fn new(config: EventBusConfig) -> Result<Self> {
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(OrderCreatedHandler);

        let broker = Arc::new(InMemoryServiceBus::new());
        let bus = ServiceBusEventBus::builder(Arc::new(config), container)
            .broker(broker)
            .connect()
            .await
            .context("Failed to connect event bus")?;

        Ok(Self { bus })
    }

    /// Subscribe handlers and publish the sample event.
    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Event Bus Node v{}", env!("CARGO_PKG_VERSION"));
        info!("  Topic: {}", self.bus.config().topic_name);
        info!("  App:   {}", self.bus.config().subscriber_client_app_name);
        info!("===========================================");

        self.bus
            .subscribe::<OrderCreatedIntegrationEvent, OrderCreatedHandler>()
            .await
            .context("Failed to subscribe OrderCreatedHandler")?;

        self.bus
            .publish(OrderCreatedIntegrationEvent::new(1, "alice"))
            .await
            .context("Failed to publish sample event")?;

        info!(subscriptions = ?self.bus.active_event_names(), "Event bus running");
        Ok(())
    }

    /// Stop receive pumps and close the broker connection.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.bus.dispose().await.context("Failed to dispose event bus")?;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Bus configuration from the environment, or the development defaults.
fn load_config() -> Result<EventBusConfig> {
    match EventBusConfig::from_env() {
        Ok(config) => Ok(config),
        Err(EventBusError::ConfigMissing { var }) => {
            warn!(%var, "Event bus configuration incomplete, using development defaults");
            EventBusConfig::builder()
                .connection_string(DEV_CONNECTION_STRING)
                .subscriber_client_app_name(DEV_APP_NAME)
                .build()
                .context("Invalid development configuration")
        }
        Err(e) => Err(e).context("Invalid event bus configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::for_service("eventbus-node");
    let _guard = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = load_config()?;
    let runtime = NodeRuntime::new(config).await?;
    runtime.start().await?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await
}
