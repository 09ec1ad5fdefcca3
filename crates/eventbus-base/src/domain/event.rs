//! # Integration Events
//!
//! Immutable facts broadcast across service boundaries, and the type
//! descriptors the registry uses to recover a payload's concrete shape.

use std::any::{Any, TypeId};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec;
use super::errors::EventBusError;

/// Identity fields shared by every integration event.
///
/// Fields are private: once constructed, the identifier and timestamp
/// cannot change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegrationEventBase {
    id: Uuid,
    created_date: DateTime<Utc>,
}

impl IntegrationEventBase {
    /// Fresh identity: random id, current time.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_date: Utc::now(),
        }
    }

    /// Identity supplied by the caller (replays, tests, upstream ids).
    pub fn with_identity(id: Uuid, created_date: DateTime<Utc>) -> Self {
        Self { id, created_date }
    }

    /// Unique event identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation timestamp.
    pub fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }
}

impl Default for IntegrationEventBase {
    fn default() -> Self {
        Self::new()
    }
}

/// An event variant that can travel over the bus.
///
/// `TYPE_NAME` is the raw type identity (for example
/// `OrderCreatedIntegrationEvent`). The canonical routing name is derived
/// from it by the [`EventNameNormalizer`](super::naming::EventNameNormalizer).
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct OrderCreatedIntegrationEvent {
///     #[serde(flatten)]
///     base: IntegrationEventBase,
///     order_id: i64,
/// }
///
/// impl IntegrationEvent for OrderCreatedIntegrationEvent {
///     const TYPE_NAME: &'static str = "OrderCreatedIntegrationEvent";
///     fn base(&self) -> &IntegrationEventBase { &self.base }
/// }
/// ```
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Raw (unnormalised) type identity.
    const TYPE_NAME: &'static str;

    /// Shared identity fields.
    fn base(&self) -> &IntegrationEventBase;

    /// Event identifier.
    fn id(&self) -> Uuid {
        self.base().id()
    }

    /// Event creation time.
    fn created_date(&self) -> DateTime<Utc> {
        self.base().created_date()
    }
}

/// A decoded event whose concrete type is known only to its handler invoker.
pub type DecodedEvent = Box<dyn Any + Send>;

/// Runtime descriptor of an event variant.
///
/// Built once per variant by an explicit registration call; carries the
/// decode function so dispatch never needs runtime type introspection.
#[derive(Clone, Copy)]
pub struct EventType {
    type_id: TypeId,
    name: &'static str,
    decode: fn(&[u8]) -> Result<DecodedEvent, EventBusError>,
}

impl EventType {
    /// Descriptor for `E`.
    pub fn of<E: IntegrationEvent>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: E::TYPE_NAME,
            decode: decode_erased::<E>,
        }
    }

    /// Raw type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type id of the variant.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Decode `payload` into the concrete variant, boxed.
    pub fn decode(&self, payload: &[u8]) -> Result<DecodedEvent, EventBusError> {
        (self.decode)(payload)
    }

    /// Returns true if this descriptor belongs to `E`.
    pub fn is<E: IntegrationEvent>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventType {}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventType").field("name", &self.name).finish()
    }
}

fn decode_erased<E: IntegrationEvent>(payload: &[u8]) -> Result<DecodedEvent, EventBusError> {
    let event: E = codec::decode_event(payload)?;
    Ok(Box::new(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct StockReservedIntegrationEvent {
        #[serde(flatten)]
        base: IntegrationEventBase,
        sku: String,
        quantity: u32,
    }

    impl IntegrationEvent for StockReservedIntegrationEvent {
        const TYPE_NAME: &'static str = "StockReservedIntegrationEvent";

        fn base(&self) -> &IntegrationEventBase {
            &self.base
        }
    }

    #[test]
    fn test_base_assigns_identity() {
        let a = IntegrationEventBase::new();
        let b = IntegrationEventBase::new();
        assert_ne!(a.id(), b.id());
        assert!(a.created_date() <= Utc::now());
    }

    #[test]
    fn test_base_with_supplied_identity() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        let base = IntegrationEventBase::with_identity(id, at);
        assert_eq!(base.id(), id);
        assert_eq!(base.created_date(), at);
    }

    #[test]
    fn test_event_type_decodes_concrete_variant() {
        let event = StockReservedIntegrationEvent {
            base: IntegrationEventBase::new(),
            sku: "SKU-1".to_string(),
            quantity: 3,
        };
        let payload = serde_json::to_vec(&event).unwrap();

        let descriptor = EventType::of::<StockReservedIntegrationEvent>();
        assert_eq!(descriptor.name(), "StockReservedIntegrationEvent");
        assert!(descriptor.is::<StockReservedIntegrationEvent>());

        let decoded = descriptor.decode(&payload).unwrap();
        let decoded = decoded
            .downcast::<StockReservedIntegrationEvent>()
            .unwrap();
        assert_eq!(*decoded, event);
    }

    #[test]
    fn test_event_type_decode_failure() {
        let descriptor = EventType::of::<StockReservedIntegrationEvent>();
        let err = descriptor.decode(b"{\"Sku\": 12}").unwrap_err();
        assert!(matches!(err, EventBusError::Deserialization { .. }));
    }

    #[test]
    fn test_wire_field_names() {
        let event = StockReservedIntegrationEvent {
            base: IntegrationEventBase::new(),
            sku: "SKU-9".to_string(),
            quantity: 1,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["Id"], serde_json::json!(event.id().to_string()));
        assert!(json.get("CreatedDate").is_some());
        assert_eq!(json["Sku"], "SKU-9");
    }
}
