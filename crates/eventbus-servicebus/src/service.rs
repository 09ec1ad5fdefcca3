//! # Service Bus Event Bus
//!
//! [`EventBus`] implementation over a topic/subscription/rule broker.
//!
//! ## Broker Layout
//!
//! ```text
//! topic: {topic_name}
//!   └── subscription: {App}.{EventName}      (one per subscribed event)
//!         └── rule: {EventName}              (CorrelationFilter on label)
//! ```
//!
//! ## Lifecycle
//!
//! | Step | Broker side | Core side |
//! |------|-------------|-----------|
//! | connect | topic created if missing | engine + registry built |
//! | first subscribe for a name | subscription, `$Default` removed, rule | binding added, pump started |
//! | further subscribes | - | binding added |
//! | unsubscribe of the last handler | rule removed (missing rule is a warning) | binding removed, pump stopped |
//! | dispose | connection closed once, handles dropped | pumps drained, registry cleared |

use std::any::type_name;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use eventbus_base::{
    encode_event, DispatchEngine, EventBus, EventBusConfig, EventBusError, HandlerId,
    HandlerResolver, IntegrationEvent, IntegrationEventHandler, CONTENT_TYPE_JSON,
};
use eventbus_telemetry::{log_event, log_message_event, metric_inc, MESSAGES_PUBLISHED};
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::domain::{BrokerError, RetryPolicy, RuleDescription, ServiceBusMessage, DEFAULT_RULE_NAME};
use crate::ports::{ServiceBusAdministration, ServiceBusConnection};
use crate::pump::{ExceptionContext, ExceptionHandler, PumpContext, ReceivePump};
use crate::COMPONENT;

#[derive(Clone)]
struct BrokerClients {
    admin: Arc<dyn ServiceBusAdministration>,
    connection: Arc<dyn ServiceBusConnection>,
}

type PumpMap = Arc<Mutex<HashMap<String, ReceivePump>>>;

/// Event bus over a Service Bus style broker.
pub struct ServiceBusEventBus {
    engine: Arc<DispatchEngine>,
    clients: RwLock<Option<BrokerClients>>,
    retry: RetryPolicy,
    topic_ready: OnceCell<()>,
    subscription_gate: tokio::sync::Mutex<()>,
    pumps: PumpMap,
    exception_handler: Option<ExceptionHandler>,
    disposed: AtomicBool,
}

impl ServiceBusEventBus {
    /// Start building a bus.
    pub fn builder(
        config: Arc<EventBusConfig>,
        resolver: Arc<dyn HandlerResolver>,
    ) -> ServiceBusEventBusBuilder {
        ServiceBusEventBusBuilder {
            config,
            resolver,
            admin: None,
            connection: None,
            retry: None,
            exception_handler: None,
        }
    }

    /// Dispatch core.
    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    /// Configuration in effect.
    pub fn config(&self) -> &Arc<EventBusConfig> {
        self.engine.config()
    }

    /// Retry policy for broker calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Broker subscription name used for `E`.
    pub fn subscription_name<E: IntegrationEvent>(&self) -> String {
        self.config().subscription_name(E::TYPE_NAME)
    }

    /// Canonical names with a running receive pump, sorted.
    pub fn active_event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pumps.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true once [`dispose`](EventBus::dispose) has started.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn clients(&self) -> Result<BrokerClients, EventBusError> {
        if self.is_disposed() {
            return Err(EventBusError::Disposed);
        }
        self.clients.read().clone().ok_or(EventBusError::Disposed)
    }

    async fn ensure_topic(&self, clients: &BrokerClients) -> Result<(), EventBusError> {
        let topic = self.config().topic_name.as_str();
        self.topic_ready
            .get_or_try_init(|| async {
                let exists = self
                    .retry
                    .run("topic_exists", || clients.admin.topic_exists(topic))
                    .await
                    .map_err(|e| e.into_provisioning(topic))?;

                if !exists {
                    match self
                        .retry
                        .run("create_topic", || clients.admin.create_topic(topic))
                        .await
                    {
                        Ok(()) => log_event!(info, COMPONENT, "Topic created", topic),
                        Err(BrokerError::EntityAlreadyExists(_)) => {
                            debug!(topic, "Topic created concurrently")
                        }
                        Err(e) => return Err(e.into_provisioning(topic)),
                    }
                }
                Ok::<(), EventBusError>(())
            })
            .await
            .map(|_| ())
    }

    /// Subscription `{App}.{EventName}` with only the event's label rule.
    async fn ensure_subscription(
        &self,
        clients: &BrokerClients,
        event_name: &str,
    ) -> Result<String, EventBusError> {
        let topic = self.config().topic_name.as_str();
        let subscription = self.config().subscription_name(event_name);
        let entity = format!("{topic}/Subscriptions/{subscription}");
        let sub = subscription.as_str();

        let exists = self
            .retry
            .run("subscription_exists", || {
                clients.admin.subscription_exists(topic, sub)
            })
            .await
            .map_err(|e| e.into_provisioning(&entity))?;

        if !exists {
            match self
                .retry
                .run("create_subscription", || {
                    clients.admin.create_subscription(topic, sub)
                })
                .await
            {
                Ok(()) => {
                    log_event!(info, COMPONENT, "Subscription created", subscription = sub);
                    self.remove_default_rule(clients, sub, &entity).await?;
                }
                Err(BrokerError::EntityAlreadyExists(_)) => {
                    debug!(subscription = sub, "Subscription created concurrently")
                }
                Err(e) => return Err(e.into_provisioning(&entity)),
            }
        }

        let rule_exists = self
            .retry
            .run("rule_exists", || clients.admin.rule_exists(topic, sub, event_name))
            .await
            .map_err(|e| e.into_provisioning(&entity))?;

        if !rule_exists {
            let created = self
                .retry
                .run("create_rule", || {
                    clients
                        .admin
                        .create_rule(topic, sub, RuleDescription::for_event(event_name))
                })
                .await;
            match created {
                Ok(()) | Err(BrokerError::EntityAlreadyExists(_)) => {
                    debug!(subscription = sub, rule = event_name, "Routing rule in place")
                }
                Err(e) => return Err(e.into_provisioning(format!("{entity}/Rules/{event_name}"))),
            }
        }

        Ok(subscription)
    }

    async fn remove_default_rule(
        &self,
        clients: &BrokerClients,
        subscription: &str,
        entity: &str,
    ) -> Result<(), EventBusError> {
        let topic = self.config().topic_name.as_str();
        let removed = self
            .retry
            .run("remove_rule", || {
                clients
                    .admin
                    .remove_rule(topic, subscription, DEFAULT_RULE_NAME)
            })
            .await;

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(
                    component = COMPONENT,
                    rule = DEFAULT_RULE_NAME,
                    subscription,
                    "The messaging entity could not be found"
                );
                Ok(())
            }
            Err(e) => Err(e.into_provisioning(format!("{entity}/Rules/{DEFAULT_RULE_NAME}"))),
        }
    }

    async fn remove_event_rule(
        &self,
        clients: &BrokerClients,
        event_name: &str,
    ) -> Result<(), EventBusError> {
        let topic = self.config().topic_name.as_str();
        let subscription = self.config().subscription_name(event_name);
        let sub = subscription.as_str();

        let removed = self
            .retry
            .run("remove_rule", || clients.admin.remove_rule(topic, sub, event_name))
            .await;

        match removed {
            Ok(()) => {
                debug!(subscription = sub, rule = event_name, "Routing rule removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    component = COMPONENT,
                    event_name,
                    subscription = sub,
                    "The messaging entity could not be found"
                );
                Ok(())
            }
            Err(e) => Err(e.into_provisioning(format!(
                "{topic}/Subscriptions/{subscription}/Rules/{event_name}"
            ))),
        }
    }

    fn start_pump(&self, clients: &BrokerClients, event_name: &str, subscription: String) {
        let config = self.config();
        let pump = ReceivePump::start(PumpContext {
            engine: Arc::clone(&self.engine),
            connection: Arc::clone(&clients.connection),
            topic: config.topic_name.clone(),
            subscription,
            event_name: event_name.to_string(),
            max_concurrent_calls: config.max_concurrent_calls,
            receive_wait: config.receive_wait,
            handler_timeout: config.handler_timeout,
            retry: self.retry,
            exception_handler: self.exception_handler.clone(),
        });

        if let Some(previous) = self.pumps.lock().insert(event_name.to_string(), pump) {
            previous.stop();
        }
    }
}

#[async_trait]
impl EventBus for ServiceBusEventBus {
    async fn publish<E: IntegrationEvent>(&self, event: E) -> Result<(), EventBusError> {
        let clients = self.clients()?;
        self.ensure_topic(&clients).await?;

        let event_name = self.engine.event_name::<E>();
        let body = encode_event(&event)?;
        let message = ServiceBusMessage::new(event_name.as_str(), body)
            .with_content_type(CONTENT_TYPE_JSON)
            .with_correlation_id(event.id().to_string());

        let topic = self.config().topic_name.as_str();
        self.retry
            .run("send", || clients.connection.send(topic, message.clone()))
            .await
            .map_err(|e| e.into_transport("send"))?;

        metric_inc!(MESSAGES_PUBLISHED, &[event_name.as_str()]);
        log_message_event!(
            debug,
            COMPONENT,
            "Event published",
            event_name,
            message.message_id,
            event_id = %event.id()
        );
        Ok(())
    }

    async fn subscribe<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        let _gate = self.subscription_gate.lock().await;
        let clients = self.clients()?;
        self.ensure_topic(&clients).await?;

        let event_name = self.engine.event_name::<E>();
        let first_binding = !self.engine.registry().has_subscription_for_event(&event_name);

        let subscription = if first_binding {
            Some(self.ensure_subscription(&clients, &event_name).await?)
        } else {
            None
        };

        self.engine.add_subscription::<E, H>()?;

        if let Some(subscription) = subscription {
            self.start_pump(&clients, &event_name, subscription);
        }

        log_event!(
            info,
            COMPONENT,
            "Subscribing to event",
            event_name = %event_name,
            handler = HandlerId::of::<H>().short_name()
        );
        Ok(())
    }

    async fn unsubscribe<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        let _gate = self.subscription_gate.lock().await;
        let clients = self.clients()?;

        let event_name = self.engine.event_name::<E>();
        let bindings = match self.engine.registry().handlers_for_event(&event_name) {
            Ok(bindings) => bindings,
            Err(EventBusError::SubscriptionNotFound(_)) => {
                warn!(
                    component = COMPONENT,
                    event_name = %event_name,
                    handler = type_name::<H>(),
                    "Unsubscribe for an event with no subscriptions"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let handler = HandlerId::of::<H>();
        let last_binding =
            bindings.len() == 1 && bindings.iter().any(|b| b.handler_id() == handler);
        if last_binding {
            self.remove_event_rule(&clients, &event_name).await?;
        }

        log_event!(
            info,
            COMPONENT,
            "Unsubscribing from event",
            event_name = %event_name,
            handler = handler.short_name()
        );
        // The registry's removal notification stops the pump.
        self.engine.remove_subscription::<E, H>()?;
        Ok(())
    }

    async fn process_event(&self, raw_name: &str, payload: &[u8]) -> Result<bool, EventBusError> {
        self.engine.process_event(raw_name, payload).await
    }

    async fn dispose(&self) -> Result<(), EventBusError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            debug!("Event bus already disposed");
            return Ok(());
        }

        // Let an in-progress subscribe finish before tearing down.
        let _gate = self.subscription_gate.lock().await;

        let pumps: Vec<ReceivePump> = self.pumps.lock().drain().map(|(_, pump)| pump).collect();
        for pump in pumps {
            pump.shutdown().await;
        }

        self.engine.dispose();

        let clients = self.clients.write().take();
        if let Some(clients) = clients {
            match clients.connection.close().await {
                Ok(()) => {}
                Err(BrokerError::Closed) => warn!("Broker connection was already closed"),
                Err(e) => return Err(e.into_transport("close")),
            }
        }

        log_event!(info, COMPONENT, "Event bus disposed");
        Ok(())
    }
}

impl Drop for ServiceBusEventBus {
    fn drop(&mut self) {
        for pump in self.pumps.lock().values() {
            pump.stop();
        }
    }
}

impl std::fmt::Debug for ServiceBusEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBusEventBus")
            .field("topic", &self.config().topic_name)
            .field("active_event_names", &self.active_event_names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for [`ServiceBusEventBus`].
pub struct ServiceBusEventBusBuilder {
    config: Arc<EventBusConfig>,
    resolver: Arc<dyn HandlerResolver>,
    admin: Option<Arc<dyn ServiceBusAdministration>>,
    connection: Option<Arc<dyn ServiceBusConnection>>,
    retry: Option<RetryPolicy>,
    exception_handler: Option<ExceptionHandler>,
}

impl ServiceBusEventBusBuilder {
    /// Use one broker client for both management and messaging.
    #[must_use]
    pub fn broker<B>(mut self, broker: Arc<B>) -> Self
    where
        B: ServiceBusAdministration + ServiceBusConnection + 'static,
    {
        self.admin = Some(broker.clone() as Arc<dyn ServiceBusAdministration>);
        self.connection = Some(broker as Arc<dyn ServiceBusConnection>);
        self
    }

    /// Set the management client.
    #[must_use]
    pub fn administration(mut self, admin: Arc<dyn ServiceBusAdministration>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Set the messaging client.
    #[must_use]
    pub fn connection(mut self, connection: Arc<dyn ServiceBusConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Override the retry policy derived from `retry_count`.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Callback for message-processing failures, after they are logged.
    #[must_use]
    pub fn on_exception<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExceptionContext) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Build the bus and make sure the topic exists.
    pub async fn connect(self) -> Result<ServiceBusEventBus, EventBusError> {
        let admin = self.admin.ok_or(EventBusError::ConfigMissing {
            var: "administration".to_string(),
        })?;
        let connection = self.connection.ok_or(EventBusError::ConfigMissing {
            var: "connection".to_string(),
        })?;
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config));

        let engine = Arc::new(DispatchEngine::new(self.config, self.resolver));

        let pumps: PumpMap = Arc::default();
        let observed = Arc::clone(&pumps);
        engine.registry().on_event_removed(move |event_name| {
            if let Some(pump) = observed.lock().remove(event_name) {
                pump.stop();
            }
        });

        let bus = ServiceBusEventBus {
            engine,
            clients: RwLock::new(Some(BrokerClients { admin, connection })),
            retry,
            topic_ready: OnceCell::new(),
            subscription_gate: tokio::sync::Mutex::new(()),
            pumps,
            exception_handler: self.exception_handler,
            disposed: AtomicBool::new(false),
        };

        let clients = bus.clients()?;
        bus.ensure_topic(&clients).await?;

        log_event!(
            info,
            COMPONENT,
            "Service Bus event bus connected",
            topic = %bus.config().topic_name,
            app = %bus.config().subscriber_client_app_name
        );
        Ok(bus)
    }
}
