//! Domain layer for the integration event bus.
//!
//! Pure types and logic: events, handler bindings, name normalisation and the
//! subscription registry. Nothing here touches a broker.

pub mod codec;
pub mod errors;
pub mod event;
pub mod handler;
pub mod naming;
pub mod registry;
pub mod subscription;

pub use codec::{decode_event, encode_event, CONTENT_TYPE_JSON};
pub use errors::{EventBusError, HandlerError};
pub use event::{DecodedEvent, EventType, IntegrationEvent, IntegrationEventBase};
pub use handler::IntegrationEventHandler;
pub use naming::{EventNameNormalizer, NamingRules, TrimStyle};
pub use registry::{RemovalObserver, SubscriptionRegistry};
pub use subscription::{HandlerId, HandlerInstance, InvokeFuture, SubscriptionInfo};
