//! Domain layer for the Service Bus transport.

pub mod errors;
pub mod message;
pub mod retry;

pub use errors::BrokerError;
pub use message::{
    CorrelationFilter, LockToken, ReceivedMessage, RuleDescription, RuleFilter, ServiceBusMessage,
    DEFAULT_RULE_NAME,
};
pub use retry::RetryPolicy;
