//! Broker adapters implementing the outbound ports.

pub mod memory;

pub use memory::{InMemoryServiceBus, DEFAULT_MAX_DELIVERY_COUNT};
