//! # Publish/Dispatch Flows
//!
//! Publish → topic → per-app subscription (rule on label) → receive pump →
//! dispatch engine → handlers → complete/abandon.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use eventbus_base::{EventBus, HandlerContainer, HandlerError, IntegrationEventHandler};
    use eventbus_servicebus::{InMemoryServiceBus, MessageAction};
    use eventbus_telemetry::MESSAGES_PUBLISHED;

    use crate::integration::fixtures::*;

    // =========================================================================
    // FAN-OUT AND ROUTING
    // =========================================================================

    /// Each subscribing application gets its own copy of the event.
    #[tokio::test]
    async fn test_event_fans_out_to_every_application() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();

        let billing = Arc::new(HandlerContainer::new());
        billing.add_singleton(RecordingOrderHandler {
            tag: "billing",
            journal: journal.clone(),
        });
        let (billing_bus, _) = connect(&broker, config_builder("Billing").build().unwrap(), billing).await;

        let shipping = Arc::new(HandlerContainer::new());
        shipping.add_singleton(RecordingOrderHandler {
            tag: "shipping",
            journal: journal.clone(),
        });
        let (shipping_bus, _) =
            connect(&broker, config_builder("Shipping").build().unwrap(), shipping).await;

        billing_bus
            .subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();
        shipping_bus
            .subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();

        assert_eq!(
            broker.subscription_names(TOPIC),
            vec!["Billing.OrderCreated", "Shipping.OrderCreated"]
        );

        billing_bus
            .publish(OrderCreatedIntegrationEvent::new(100))
            .await
            .unwrap();

        eventually("both applications", || journal.lock().len() == 2).await;
        let mut seen = journal.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["billing:100", "shipping:100"]);
    }

    /// A subscription only receives messages whose label matches its rule.
    #[tokio::test]
    async fn test_rule_filters_other_event_names() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container
            .add_singleton(RecordingOrderHandler {
                tag: "order",
                journal: journal.clone(),
            })
            .add_singleton(RecordingPaymentHandler(journal.clone()));
        let (bus, _) = connect(&broker, config_builder("Ordering").build().unwrap(), container).await;

        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();
        bus.subscribe::<PaymentSucceededIntegrationEvent, RecordingPaymentHandler>()
            .await
            .unwrap();

        bus.publish(PaymentSucceededIntegrationEvent::new(7))
            .await
            .unwrap();

        eventually("payment handled", || journal.lock().len() == 1).await;
        assert_eq!(*journal.lock(), vec!["paid:7"]);
        assert_eq!(broker.active_message_count(TOPIC, "Ordering.OrderCreated"), 0);
        assert_eq!(broker.locked_message_count(TOPIC, "Ordering.OrderCreated"), 0);
        assert!(MESSAGES_PUBLISHED
            .with_label_values(&["PaymentSucceeded"])
            .get()
            >= 1.0);
    }

    /// Publishing with nobody subscribed is not an error.
    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let (bus, reports) = connect(
            &broker,
            config_builder("Ordering").build().unwrap(),
            Arc::new(HandlerContainer::new()),
        )
        .await;

        bus.publish(OrderCreatedIntegrationEvent::new(1))
            .await
            .unwrap();

        assert!(broker.subscription_names(TOPIC).is_empty());
        assert!(reports.lock().is_empty());
    }

    /// Suffix trimmed by character set: the label is `Notific`, and dispatch
    /// still decodes with the handler's registered event type.
    #[tokio::test]
    async fn test_overtrimmed_name_still_dispatches() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(RecordingNotificationHandler(journal.clone()));
        let (bus, reports) =
            connect(&broker, config_builder("Alerts").build().unwrap(), container).await;

        bus.subscribe::<NotificationIntegrationEvent, RecordingNotificationHandler>()
            .await
            .unwrap();
        assert_eq!(broker.subscription_names(TOPIC), vec!["Alerts.Notific"]);

        bus.publish(NotificationIntegrationEvent {
            base: eventbus_base::IntegrationEventBase::new(),
            text: "disk almost full".to_string(),
        })
        .await
        .unwrap();

        eventually("notification handled", || journal.lock().len() == 1).await;
        assert_eq!(*journal.lock(), vec!["disk almost full"]);
        assert!(reports.lock().is_empty());
    }

    // =========================================================================
    // FAILURE HANDLING
    // =========================================================================

    struct SlowHandler;

    #[async_trait]
    impl IntegrationEventHandler<OrderCreatedIntegrationEvent> for SlowHandler {
        async fn handle(&self, _event: OrderCreatedIntegrationEvent) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    /// A handler exceeding the dispatch timeout is reported and the message
    /// goes back to the broker, which dead-letters it at the delivery limit.
    #[tokio::test]
    async fn test_handler_timeout_dead_letters() {
        let broker = Arc::new(InMemoryServiceBus::with_max_delivery_count(1));
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(SlowHandler);
        let config = config_builder("Ordering")
            .handler_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let (bus, reports) = connect(&broker, config, container).await;

        bus.subscribe::<OrderCreatedIntegrationEvent, SlowHandler>()
            .await
            .unwrap();
        bus.publish(OrderCreatedIntegrationEvent::new(3))
            .await
            .unwrap();

        eventually("dead letter", || {
            broker.dead_letters(TOPIC, "Ordering.OrderCreated").len() == 1
        })
        .await;

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].action, MessageAction::Dispatch);
        assert_eq!(reports[0].event_name, "OrderCreated");
        assert!(reports[0].error.contains("timed out"));
    }

    /// A payload that does not decode is reported and dead-lettered.
    #[tokio::test]
    async fn test_undecodable_payload_dead_letters() {
        use eventbus_servicebus::{ServiceBusConnection, ServiceBusMessage};

        let broker = Arc::new(InMemoryServiceBus::with_max_delivery_count(1));
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(RecordingOrderHandler {
            tag: "order",
            journal: journal.clone(),
        });
        let (bus, reports) =
            connect(&broker, config_builder("Ordering").build().unwrap(), container).await;
        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();

        broker
            .send(TOPIC, ServiceBusMessage::new("OrderCreated", b"not json".to_vec()))
            .await
            .unwrap();

        eventually("dead letter", || {
            broker.dead_letters(TOPIC, "Ordering.OrderCreated").len() == 1
        })
        .await;
        assert!(journal.lock().is_empty());
        assert_eq!(reports.lock().len(), 1);
    }

    // =========================================================================
    // CONCURRENCY
    // =========================================================================

    struct GaugedHandler {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        done: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IntegrationEventHandler<OrderCreatedIntegrationEvent> for GaugedHandler {
        async fn handle(&self, _event: OrderCreatedIntegrationEvent) -> Result<(), HandlerError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// In-flight dispatches never exceed `max_concurrent_calls`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_max_concurrent_calls_is_respected() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(GaugedHandler {
            in_flight: in_flight.clone(),
            peak: peak.clone(),
            done: done.clone(),
        });
        let config = config_builder("Ordering")
            .max_concurrent_calls(3)
            .build()
            .unwrap();
        let (bus, _) = connect(&broker, config, container).await;

        bus.subscribe::<OrderCreatedIntegrationEvent, GaugedHandler>()
            .await
            .unwrap();
        for order_id in 0..12 {
            bus.publish(OrderCreatedIntegrationEvent::new(order_id))
                .await
                .unwrap();
        }

        eventually("all dispatched", || done.load(Ordering::SeqCst) == 12).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}
