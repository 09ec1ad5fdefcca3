//! # Service Bus Transport
//!
//! Topic/subscription/rule transport adapter for the integration event bus.
//!
//! Every service publishes to one shared topic. Each subscriber application
//! owns one subscription per event name, named `{App}.{EventName}`, carrying
//! a single correlation rule that matches the message label. The broker's
//! catch-all `$Default` rule is removed when the subscription is created.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ServiceBusEventBus                       │
//! │        (implements eventbus_base::EventBus)                 │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │ provisioning                 │ receive pumps                │
//! │ topic / subscription / rule  │ one per event name,          │
//! │ via ServiceBusAdministration │ bounded by max_concurrent    │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │ outbound ports: ServiceBusAdministration + Connection       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ adapters: InMemoryServiceBus                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let broker = Arc::new(InMemoryServiceBus::new());
//! let bus = ServiceBusEventBus::builder(config, container)
//!     .broker(broker)
//!     .connect()
//!     .await?;
//!
//! bus.subscribe::<OrderCreatedIntegrationEvent, OrderCreatedHandler>().await?;
//! bus.publish(event).await?;
//! bus.dispose().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod pump;
pub mod service;

pub use adapters::{InMemoryServiceBus, DEFAULT_MAX_DELIVERY_COUNT};
pub use domain::{
    BrokerError, CorrelationFilter, LockToken, ReceivedMessage, RetryPolicy, RuleDescription,
    RuleFilter, ServiceBusMessage, DEFAULT_RULE_NAME,
};
pub use ports::{ServiceBusAdministration, ServiceBusConnection};
pub use pump::{ExceptionContext, ExceptionHandler, MessageAction, DRAIN_TIMEOUT};
pub use service::{ServiceBusEventBus, ServiceBusEventBusBuilder};

/// `component` field value on this crate's log events.
pub const COMPONENT: &str = "servicebus";
