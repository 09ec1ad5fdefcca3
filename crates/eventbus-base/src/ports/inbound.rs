//! Inbound (driving) port: the event bus API.

use async_trait::async_trait;

use crate::domain::{EventBusError, IntegrationEvent, IntegrationEventHandler};

/// Publish/subscribe surface implemented by every transport adapter.
///
/// Adapters own broker provisioning and delegate bookkeeping and dispatch
/// to a shared [`DispatchEngine`](crate::DispatchEngine).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event. Fire-and-forget from the caller's point of view:
    /// processing failures never come back here.
    async fn publish<E: IntegrationEvent>(&self, event: E) -> Result<(), EventBusError>;

    /// Ensure broker routing for `E` exists, then bind `H` to it.
    async fn subscribe<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>;

    /// Unbind `H` from `E`. Broker routing is torn down when the last
    /// binding for the event name goes away.
    async fn unsubscribe<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>;

    /// Dispatch one raw `(label, payload)` pair.
    ///
    /// Returns `Ok(false)` when nothing is bound to the name.
    async fn process_event(&self, raw_name: &str, payload: &[u8]) -> Result<bool, EventBusError>;

    /// Release broker connections and clear the registry. Idempotent.
    async fn dispose(&self) -> Result<(), EventBusError>;
}
