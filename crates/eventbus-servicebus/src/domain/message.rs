//! # Message Envelope and Routing Rules
//!
//! The envelope carries the serialized event in `body` and the canonical
//! event name in `label`. Subscriptions route on the label through
//! correlation-filter rules named after the event.

use std::fmt;

use uuid::Uuid;

/// Name of the catch-all rule a broker creates with every subscription.
pub const DEFAULT_RULE_NAME: &str = "$Default";

/// Outgoing or delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBusMessage {
    /// Unique message identifier, fresh per publish.
    pub message_id: String,
    /// Routing label: the canonical event name.
    pub label: String,
    /// Body content type.
    pub content_type: Option<String>,
    /// Correlation identifier (the event id on publish).
    pub correlation_id: Option<String>,
    /// Serialized event.
    pub body: Vec<u8>,
}

impl ServiceBusMessage {
    /// New message with a fresh id.
    pub fn new(label: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            label: label.into(),
            content_type: None,
            correlation_id: None,
            body,
        }
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Peek-lock token identifying one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    /// Fresh token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message delivered under a peek lock.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// The delivered message.
    pub message: ServiceBusMessage,
    /// Token for `complete`/`abandon`.
    pub lock_token: LockToken,
    /// Number of deliveries including this one.
    pub delivery_count: u32,
}

/// Correlation filter; every set property must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationFilter {
    /// Required label.
    pub label: Option<String>,
    /// Required correlation id.
    pub correlation_id: Option<String>,
}

impl CorrelationFilter {
    /// Filter on the label only.
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            correlation_id: None,
        }
    }

    /// Returns true if `message` satisfies the filter.
    pub fn matches(&self, message: &ServiceBusMessage) -> bool {
        let label_ok = self
            .label
            .as_deref()
            .map_or(true, |label| label == message.label);
        let correlation_ok = self
            .correlation_id
            .as_deref()
            .map_or(true, |id| message.correlation_id.as_deref() == Some(id));
        label_ok && correlation_ok
    }
}

/// Rule filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFilter {
    /// Matches every message.
    True,
    /// Matches on message properties.
    Correlation(CorrelationFilter),
}

impl RuleFilter {
    /// Returns true if `message` passes the filter.
    pub fn matches(&self, message: &ServiceBusMessage) -> bool {
        match self {
            RuleFilter::True => true,
            RuleFilter::Correlation(filter) => filter.matches(message),
        }
    }
}

/// Named subscription rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDescription {
    /// Rule name.
    pub name: String,
    /// Rule filter.
    pub filter: RuleFilter,
}

impl RuleDescription {
    /// The broker's catch-all rule.
    pub fn default_rule() -> Self {
        Self {
            name: DEFAULT_RULE_NAME.to_string(),
            filter: RuleFilter::True,
        }
    }

    /// Rule named after `event_name` that admits only messages labelled with it.
    pub fn for_event(event_name: &str) -> Self {
        Self {
            name: event_name.to_string(),
            filter: RuleFilter::Correlation(CorrelationFilter::label(event_name)),
        }
    }
}
