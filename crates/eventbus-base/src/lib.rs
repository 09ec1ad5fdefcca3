//! # Event Bus Base
//!
//! Transport-agnostic core of the integration event bus: lets components
//! publish integration events and have independently registered handlers
//! invoked when matching events arrive, while the broker stays swappable.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | One binding per (event name, handler) | `domain/registry.rs` - `add_subscription()` |
//! | Name present iff it has a live binding | `domain/registry.rs` - `remove_subscription()` |
//! | Removal notification fires once, outside the lock | `domain/registry.rs` - `raise_event_removed()` |
//! | Registry and dispatch agree on keys | `domain/naming.rs` - shared `EventNameNormalizer` |
//! | Handlers run sequentially, registration order | `service.rs` - `process_event()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - HandlerContainer (HandlerResolver implementation)  │
//! │  transport crates (eventbus-servicebus) implement EventBus     │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - EventBus trait                            │
//! │  ports/outbound.rs - HandlerResolver trait                     │
//! │  service.rs        - DispatchEngine                            │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/event.rs        - IntegrationEvent, EventType          │
//! │  domain/naming.rs       - EventNameNormalizer                  │
//! │  domain/subscription.rs - SubscriptionInfo, HandlerId          │
//! │  domain/registry.rs     - SubscriptionRegistry                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::HandlerContainer;
pub use config::{EventBusConfig, EventBusConfigBuilder};
pub use domain::{
    decode_event, encode_event, EventBusError, EventNameNormalizer, EventType, HandlerError,
    HandlerId, HandlerInstance, IntegrationEvent, IntegrationEventBase, IntegrationEventHandler,
    NamingRules, SubscriptionInfo, SubscriptionRegistry, TrimStyle, CONTENT_TYPE_JSON,
};
pub use ports::{EventBus, HandlerResolver};
pub use service::DispatchEngine;

// Handler impls can use `#[eventbus_base::async_trait]`.
pub use async_trait::async_trait;
