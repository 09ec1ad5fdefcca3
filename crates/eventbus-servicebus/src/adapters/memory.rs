//! # In-Memory Service Bus
//!
//! Single-process broker implementing both broker ports.
//!
//! - Topics fan out to subscriptions whose rules match the message.
//! - New subscriptions get the catch-all `$Default` rule.
//! - Peek-lock delivery: a received message stays locked until completed
//!   or abandoned; abandon returns it to the front of the queue.
//! - After `max_delivery_count` deliveries an abandoned message moves to the
//!   subscription's dead-letter queue.
//!
//! Suitable for tests and single-node hosting; nothing survives a restart.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::domain::{
    BrokerError, LockToken, ReceivedMessage, RuleDescription, ServiceBusMessage,
};
use crate::ports::{ServiceBusAdministration, ServiceBusConnection};

/// Default deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

#[derive(Debug, Clone)]
struct Queued {
    message: ServiceBusMessage,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct Subscription {
    rules: BTreeMap<String, RuleDescription>,
    active: VecDeque<Queued>,
    locked: HashMap<LockToken, Queued>,
    dead_letters: Vec<ServiceBusMessage>,
}

impl Subscription {
    fn with_default_rule() -> Self {
        let mut subscription = Self::default();
        let rule = RuleDescription::default_rule();
        subscription.rules.insert(rule.name.clone(), rule);
        subscription
    }

    fn accepts(&self, message: &ServiceBusMessage) -> bool {
        self.rules.values().any(|rule| rule.filter.matches(message))
    }
}

#[derive(Debug, Default)]
struct Topic {
    subscriptions: BTreeMap<String, Subscription>,
}

/// In-memory topic/subscription broker.
#[derive(Debug)]
pub struct InMemoryServiceBus {
    topics: Mutex<HashMap<String, Topic>>,
    notify: Notify,
    closed: AtomicBool,
    max_delivery_count: u32,
    failing_sends: AtomicU32,
}

impl InMemoryServiceBus {
    /// Empty broker with the default max delivery count.
    pub fn new() -> Self {
        Self::with_max_delivery_count(DEFAULT_MAX_DELIVERY_COUNT)
    }

    /// Empty broker that dead-letters after `max_delivery_count` deliveries.
    pub fn with_max_delivery_count(max_delivery_count: u32) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            max_delivery_count: max_delivery_count.max(1),
            failing_sends: AtomicU32::new(0),
        }
    }

    /// Make the next `count` sends fail with a transient error.
    pub fn fail_next_sends(&self, count: u32) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Subscription names on a topic, sorted.
    pub fn subscription_names(&self, topic: &str) -> Vec<String> {
        self.topics
            .lock()
            .get(topic)
            .map(|t| t.subscriptions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Rule names on a subscription, sorted.
    pub fn rule_names(&self, topic: &str, subscription: &str) -> Vec<String> {
        self.with_subscription(topic, subscription, |s| s.rules.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Messages waiting for delivery.
    pub fn active_message_count(&self, topic: &str, subscription: &str) -> usize {
        self.with_subscription(topic, subscription, |s| s.active.len())
            .unwrap_or(0)
    }

    /// Messages delivered but not yet settled.
    pub fn locked_message_count(&self, topic: &str, subscription: &str) -> usize {
        self.with_subscription(topic, subscription, |s| s.locked.len())
            .unwrap_or(0)
    }

    /// Dead-lettered messages.
    pub fn dead_letters(&self, topic: &str, subscription: &str) -> Vec<ServiceBusMessage> {
        self.with_subscription(topic, subscription, |s| s.dead_letters.clone())
            .unwrap_or_default()
    }

    fn with_subscription<T>(
        &self,
        topic: &str,
        subscription: &str,
        f: impl FnOnce(&Subscription) -> T,
    ) -> Option<T> {
        let topics = self.topics.lock();
        topics
            .get(topic)
            .and_then(|t| t.subscriptions.get(subscription))
            .map(f)
    }

    fn with_subscription_mut<T>(
        &self,
        topic: &str,
        subscription: &str,
        f: impl FnOnce(&mut Subscription) -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let mut topics = self.topics.lock();
        let t = topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::EntityNotFound(topic.to_string()))?;
        let s = t
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| BrokerError::EntityNotFound(format!("{topic}/{subscription}")))?;
        f(s)
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    fn try_receive(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<Option<ReceivedMessage>, BrokerError> {
        self.with_subscription_mut(topic, subscription, |s| {
            let Some(mut queued) = s.active.pop_front() else {
                return Ok(None);
            };
            queued.delivery_count += 1;
            let lock_token = LockToken::new();
            let received = ReceivedMessage {
                message: queued.message.clone(),
                lock_token,
                delivery_count: queued.delivery_count,
            };
            s.locked.insert(lock_token, queued);
            Ok(Some(received))
        })
    }
}

impl Default for InMemoryServiceBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceBusAdministration for InMemoryServiceBus {
    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError> {
        Ok(self.topics.lock().contains_key(topic))
    }

    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError> {
        let mut topics = self.topics.lock();
        if topics.contains_key(topic) {
            return Err(BrokerError::EntityAlreadyExists(topic.to_string()));
        }
        topics.insert(topic.to_string(), Topic::default());
        debug!(topic, "Topic created");
        Ok(())
    }

    async fn subscription_exists(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<bool, BrokerError> {
        let topics = self.topics.lock();
        let t = topics
            .get(topic)
            .ok_or_else(|| BrokerError::EntityNotFound(topic.to_string()))?;
        Ok(t.subscriptions.contains_key(subscription))
    }

    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<(), BrokerError> {
        let mut topics = self.topics.lock();
        let t = topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::EntityNotFound(topic.to_string()))?;
        if t.subscriptions.contains_key(subscription) {
            return Err(BrokerError::EntityAlreadyExists(format!(
                "{topic}/{subscription}"
            )));
        }
        t.subscriptions
            .insert(subscription.to_string(), Subscription::with_default_rule());
        debug!(topic, subscription, "Subscription created");
        Ok(())
    }

    async fn rule_exists(
        &self,
        topic: &str,
        subscription: &str,
        rule: &str,
    ) -> Result<bool, BrokerError> {
        self.with_subscription_mut(topic, subscription, |s| Ok(s.rules.contains_key(rule)))
    }

    async fn create_rule(
        &self,
        topic: &str,
        subscription: &str,
        rule: RuleDescription,
    ) -> Result<(), BrokerError> {
        self.with_subscription_mut(topic, subscription, |s| {
            if s.rules.contains_key(&rule.name) {
                return Err(BrokerError::EntityAlreadyExists(format!(
                    "{topic}/{subscription}/{}",
                    rule.name
                )));
            }
            debug!(topic, subscription, rule = %rule.name, "Rule created");
            s.rules.insert(rule.name.clone(), rule);
            Ok(())
        })
    }

    async fn remove_rule(
        &self,
        topic: &str,
        subscription: &str,
        rule: &str,
    ) -> Result<(), BrokerError> {
        self.with_subscription_mut(topic, subscription, |s| {
            s.rules
                .remove(rule)
                .map(|_| debug!(topic, subscription, rule, "Rule removed"))
                .ok_or_else(|| BrokerError::EntityNotFound(format!("{topic}/{subscription}/{rule}")))
        })
    }
}

#[async_trait]
impl ServiceBusConnection for InMemoryServiceBus {
    async fn send(&self, topic: &str, message: ServiceBusMessage) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrokerError::Transient("server busy".to_string()));
        }

        let delivered = {
            let mut topics = self.topics.lock();
            let t = topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::EntityNotFound(topic.to_string()))?;

            let mut delivered = 0usize;
            for subscription in t.subscriptions.values_mut() {
                if subscription.accepts(&message) {
                    subscription.active.push_back(Queued {
                        message: message.clone(),
                        delivery_count: 0,
                    });
                    delivered += 1;
                }
            }
            delivered
        };

        debug!(
            topic,
            label = %message.label,
            message_id = %message.message_id,
            subscriptions = delivered,
            "Message sent"
        );
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        topic: &str,
        subscription: &str,
        max_wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            // Register interest before checking so a send in between still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            if let Some(received) = self.try_receive(topic, subscription)? {
                return Ok(Some(received));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn complete(
        &self,
        topic: &str,
        subscription: &str,
        lock_token: LockToken,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.with_subscription_mut(topic, subscription, |s| {
            s.locked
                .remove(&lock_token)
                .map(|_| ())
                .ok_or_else(|| BrokerError::LockLost(lock_token.to_string()))
        })
    }

    async fn abandon(
        &self,
        topic: &str,
        subscription: &str,
        lock_token: LockToken,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let max_delivery_count = self.max_delivery_count;
        self.with_subscription_mut(topic, subscription, |s| {
            let queued = s
                .locked
                .remove(&lock_token)
                .ok_or_else(|| BrokerError::LockLost(lock_token.to_string()))?;

            if queued.delivery_count >= max_delivery_count {
                warn!(
                    topic,
                    subscription,
                    message_id = %queued.message.message_id,
                    deliveries = queued.delivery_count,
                    "Max delivery count exceeded, message dead-lettered"
                );
                s.dead_letters.push(queued.message);
            } else {
                s.active.push_front(queued);
            }
            Ok(())
        })?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::Closed);
        }
        debug!("In-memory broker closed");
        self.notify.notify_waiters();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
