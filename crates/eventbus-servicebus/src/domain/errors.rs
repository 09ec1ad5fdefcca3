//! Broker-side errors.

use eventbus_base::EventBusError;
use thiserror::Error;

/// Errors reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Topic, subscription or rule does not exist.
    #[error("Messaging entity not found: {0}")]
    EntityNotFound(String),

    /// Topic, subscription or rule already exists.
    #[error("Messaging entity already exists: {0}")]
    EntityAlreadyExists(String),

    /// Retryable failure (throttling, server busy, timeout).
    #[error("Transient broker failure: {0}")]
    Transient(String),

    /// The client has been closed.
    #[error("Broker connection closed")]
    Closed,

    /// The lock token is unknown or expired.
    #[error("Message lock lost: {0}")]
    LockLost(String),

    /// Any other broker failure.
    #[error("Broker failure: {0}")]
    Other(String),
}

impl BrokerError {
    /// Returns true for "entity not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, BrokerError::EntityNotFound(_))
    }

    /// Returns true if retrying may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_))
    }

    /// Map to a core error for a failed provisioning step.
    pub fn into_provisioning(self, entity: impl Into<String>) -> EventBusError {
        match self {
            BrokerError::Closed => EventBusError::Disposed,
            other => EventBusError::Provisioning {
                entity: entity.into(),
                cause: other.to_string(),
            },
        }
    }

    /// Map to a core error for a failed send/receive/settle call.
    pub fn into_transport(self, operation: impl Into<String>) -> EventBusError {
        match self {
            BrokerError::Closed => EventBusError::Disposed,
            other => EventBusError::Transport {
                operation: operation.into(),
                transient: other.is_transient(),
                cause: other.to_string(),
            },
        }
    }
}

impl From<BrokerError> for EventBusError {
    fn from(err: BrokerError) -> Self {
        err.into_transport("broker")
    }
}
