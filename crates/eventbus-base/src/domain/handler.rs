//! Integration event handler contract.

use async_trait::async_trait;

use super::errors::HandlerError;
use super::event::IntegrationEvent;

/// Handles one event variant.
///
/// Handlers are resolved per dispatch through a
/// [`HandlerResolver`](crate::ports::HandlerResolver); returning `Err` leaves
/// the broker message unacknowledged.
#[async_trait]
pub trait IntegrationEventHandler<E: IntegrationEvent>: Send + Sync + 'static {
    /// Handle a single event.
    async fn handle(&self, event: E) -> Result<(), HandlerError>;
}
