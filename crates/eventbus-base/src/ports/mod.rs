//! Ports layer for the event bus core.
//!
//! - Inbound (driving) port: [`EventBus`], the surface applications call.
//! - Outbound (driven) port: [`HandlerResolver`], how the core obtains
//!   live handler instances.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
