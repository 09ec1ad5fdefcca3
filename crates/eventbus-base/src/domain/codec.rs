//! JSON codec for integration event payloads.

use super::errors::EventBusError;
use super::event::IntegrationEvent;

/// Content type stamped on outgoing messages.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Serialize an event, including its identity fields.
pub fn encode_event<E: IntegrationEvent>(event: &E) -> Result<Vec<u8>, EventBusError> {
    serde_json::to_vec(event).map_err(|e| EventBusError::Serialization {
        event_type: E::TYPE_NAME.to_string(),
        cause: e.to_string(),
    })
}

/// Deserialize a payload against the concrete event type `E`.
pub fn decode_event<E: IntegrationEvent>(payload: &[u8]) -> Result<E, EventBusError> {
    serde_json::from_slice(payload).map_err(|e| EventBusError::Deserialization {
        event_type: E::TYPE_NAME.to_string(),
        cause: e.to_string(),
    })
}
