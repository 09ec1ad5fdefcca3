//! Outbound (driven) ports: the broker capability contract.
//!
//! Split the way broker SDKs split it: a management client for entities
//! and a messaging client for traffic. Existence checks return booleans;
//! errors are reserved for genuine broker failures.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{BrokerError, LockToken, ReceivedMessage, RuleDescription, ServiceBusMessage};

/// Topic, subscription and rule management.
#[async_trait]
pub trait ServiceBusAdministration: Send + Sync {
    /// Returns true if the topic exists.
    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError>;

    /// Create a topic. Fails with `EntityAlreadyExists` if present.
    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError>;

    /// Returns true if the subscription exists.
    async fn subscription_exists(&self, topic: &str, subscription: &str)
        -> Result<bool, BrokerError>;

    /// Create a subscription with the broker's catch-all `$Default` rule.
    async fn create_subscription(&self, topic: &str, subscription: &str)
        -> Result<(), BrokerError>;

    /// Returns true if the rule exists on the subscription.
    async fn rule_exists(
        &self,
        topic: &str,
        subscription: &str,
        rule: &str,
    ) -> Result<bool, BrokerError>;

    /// Add a rule to the subscription.
    async fn create_rule(
        &self,
        topic: &str,
        subscription: &str,
        rule: RuleDescription,
    ) -> Result<(), BrokerError>;

    /// Remove a rule. Fails with `EntityNotFound` if absent.
    async fn remove_rule(
        &self,
        topic: &str,
        subscription: &str,
        rule: &str,
    ) -> Result<(), BrokerError>;
}

/// Message traffic over a topic and its subscriptions.
#[async_trait]
pub trait ServiceBusConnection: Send + Sync {
    /// Send a message to the topic.
    async fn send(&self, topic: &str, message: ServiceBusMessage) -> Result<(), BrokerError>;

    /// Receive one message under a peek lock, waiting up to `max_wait`.
    async fn receive(
        &self,
        topic: &str,
        subscription: &str,
        max_wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerError>;

    /// Settle a delivery as processed.
    async fn complete(
        &self,
        topic: &str,
        subscription: &str,
        lock_token: LockToken,
    ) -> Result<(), BrokerError>;

    /// Release a delivery for redelivery.
    async fn abandon(
        &self,
        topic: &str,
        subscription: &str,
        lock_token: LockToken,
    ) -> Result<(), BrokerError>;

    /// Close the connection. Later calls fail with `Closed`.
    async fn close(&self) -> Result<(), BrokerError>;

    /// Returns true once closed.
    fn is_closed(&self) -> bool;
}
