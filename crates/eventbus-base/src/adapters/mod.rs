//! Adapters for the event bus core's outbound ports.

pub mod handler_container;

pub use handler_container::HandlerContainer;
