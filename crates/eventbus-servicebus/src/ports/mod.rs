//! Ports layer for the Service Bus transport.
//!
//! Outbound (driven) ports only: the broker capability contract the adapter
//! needs. The inbound port is `eventbus_base::EventBus`.

pub mod outbound;

pub use outbound::*;
