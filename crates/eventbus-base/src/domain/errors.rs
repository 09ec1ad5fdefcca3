//! # Domain Errors
//!
//! Error taxonomy for the integration event bus.
//!
//! | Class | Variants | Disposition |
//! |-------|----------|-------------|
//! | Configuration | `DuplicateBinding`, `ConfigMissing`, `ConfigInvalid` | Surfaced to caller, never retried |
//! | Not found | `SubscriptionNotFound`, `EventTypeNotFound` | Caller bug, guard with existence checks |
//! | Provisioning | `Provisioning`, `Transport` | Surfaced on subscribe/publish |
//! | Handler | `HandlerFailed`, `HandlerTimeout` | Propagated to the transport, message not acknowledged |
//! | Serialization | `Serialization`, `Deserialization` | Same as handler failures |

use thiserror::Error;

/// Boxed error returned by integration event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the event bus core and its transports.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The handler is already bound to this event name.
    #[error("Handler {handler} already registered for '{event_name}'")]
    DuplicateBinding {
        /// Canonical event name.
        event_name: String,
        /// Handler type name.
        handler: String,
    },

    /// No bindings exist for the event name.
    #[error("No subscriptions for event '{0}'")]
    SubscriptionNotFound(String),

    /// No event type is registered under the raw or canonical name.
    #[error("No event type registered for '{0}'")]
    EventTypeNotFound(String),

    /// Required configuration value is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing {
        /// Variable or field name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid {
        /// Variable or field name.
        var: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Broker entity could not be provisioned.
    #[error("Failed to provision {entity}: {cause}")]
    Provisioning {
        /// Topic, subscription or rule path.
        entity: String,
        /// Underlying broker error.
        cause: String,
    },

    /// Broker call failed outside provisioning.
    #[error("Transport error during {operation}: {cause}")]
    Transport {
        /// Operation being attempted (send, complete, ...).
        operation: String,
        /// Underlying broker error.
        cause: String,
        /// Whether the broker reported the failure as retryable.
        transient: bool,
    },

    /// Event could not be encoded.
    #[error("Failed to serialize event type {event_type}: {cause}")]
    Serialization {
        /// Raw event type name.
        event_type: String,
        /// Codec error.
        cause: String,
    },

    /// Payload could not be decoded against the resolved event type.
    #[error("Failed to deserialize event type {event_type}: {cause}")]
    Deserialization {
        /// Raw event type name.
        event_type: String,
        /// Codec error.
        cause: String,
    },

    /// A handler returned an error.
    #[error("Handler {handler} failed for event '{event_name}': {cause}")]
    HandlerFailed {
        /// Canonical event name.
        event_name: String,
        /// Handler type name.
        handler: String,
        /// Handler error message.
        cause: String,
    },

    /// Dispatch did not finish within the configured per-message timeout.
    #[error("Dispatch of '{event_name}' timed out after {timeout_ms}ms")]
    HandlerTimeout {
        /// Canonical event name.
        event_name: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The bus has been disposed.
    #[error("Event bus disposed")]
    Disposed,
}

impl EventBusError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventBusError::Transport {
                transient: true,
                ..
            } | EventBusError::HandlerTimeout { .. }
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EventBusError::DuplicateBinding { .. }
                | EventBusError::ConfigMissing { .. }
                | EventBusError::ConfigInvalid { .. }
        )
    }

    /// Returns true if the error came from handler execution or payload decoding.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            EventBusError::HandlerFailed { .. }
                | EventBusError::HandlerTimeout { .. }
                | EventBusError::Deserialization { .. }
        )
    }
}
