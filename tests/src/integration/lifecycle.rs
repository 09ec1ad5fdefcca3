//! # Subscription Lifecycle
//!
//! Unsubscribe removes the routing rule only with the last handler; dispose
//! stops every pump and closes the broker connection once.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eventbus_base::{EventBus, EventBusError, HandlerContainer};
    use eventbus_servicebus::{InMemoryServiceBus, ServiceBusConnection};

    use crate::integration::fixtures::*;

    struct OtherOrderHandler(Journal);

    #[async_trait::async_trait]
    impl eventbus_base::IntegrationEventHandler<OrderCreatedIntegrationEvent> for OtherOrderHandler {
        async fn handle(
            &self,
            event: OrderCreatedIntegrationEvent,
        ) -> Result<(), eventbus_base::HandlerError> {
            self.0.lock().push(format!("other:{}", event.order_id));
            Ok(())
        }
    }

    /// Works against any bus implementation.
    async fn subscribe_both<B: EventBus>(bus: &B) -> Result<(), EventBusError> {
        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await?;
        bus.subscribe::<OrderCreatedIntegrationEvent, OtherOrderHandler>()
            .await
    }

    #[tokio::test]
    async fn test_partial_unsubscribe_keeps_delivery() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container
            .add_singleton(RecordingOrderHandler {
                tag: "order",
                journal: journal.clone(),
            })
            .add_singleton(OtherOrderHandler(journal.clone()));
        let (bus, _) = connect(&broker, config_builder("Ordering").build().unwrap(), container).await;
        subscribe_both(&bus).await.unwrap();

        bus.unsubscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();
        bus.publish(OrderCreatedIntegrationEvent::new(4))
            .await
            .unwrap();

        eventually("remaining handler", || journal.lock().len() == 1).await;
        assert_eq!(*journal.lock(), vec!["other:4"]);
    }

    #[tokio::test]
    async fn test_full_unsubscribe_stops_routing() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container
            .add_singleton(RecordingOrderHandler {
                tag: "order",
                journal: journal.clone(),
            })
            .add_singleton(OtherOrderHandler(journal.clone()));
        let (bus, _) = connect(&broker, config_builder("Ordering").build().unwrap(), container).await;
        subscribe_both(&bus).await.unwrap();

        bus.unsubscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();
        bus.unsubscribe::<OrderCreatedIntegrationEvent, OtherOrderHandler>()
            .await
            .unwrap();

        assert!(broker.rule_names(TOPIC, "Ordering.OrderCreated").is_empty());
        assert!(bus.active_event_names().is_empty());

        // Subscription remains but without a rule nothing is delivered.
        bus.publish(OrderCreatedIntegrationEvent::new(8))
            .await
            .unwrap();
        assert_eq!(broker.active_message_count(TOPIC, "Ordering.OrderCreated"), 0);
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_rule_on_unsubscribe_is_tolerated() {
        use eventbus_servicebus::ServiceBusAdministration;

        let broker = Arc::new(InMemoryServiceBus::new());
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(RecordingOrderHandler {
            tag: "order",
            journal: Journal::default(),
        });
        let (bus, _) = connect(&broker, config_builder("Ordering").build().unwrap(), container).await;
        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();

        // Rule removed out of band.
        broker
            .remove_rule(TOPIC, "Ordering.OrderCreated", "OrderCreated")
            .await
            .unwrap();

        bus.unsubscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();
        assert!(!bus
            .engine()
            .registry()
            .has_subscription::<OrderCreatedIntegrationEvent>());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_final() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(RecordingOrderHandler {
            tag: "order",
            journal: Journal::default(),
        });
        let (bus, _) = connect(&broker, config_builder("Ordering").build().unwrap(), container).await;
        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();

        bus.dispose().await.unwrap();
        bus.dispose().await.unwrap();

        assert!(broker.is_closed());
        assert!(bus.active_event_names().is_empty());
        assert!(matches!(
            bus.process_event("OrderCreated", b"{}").await,
            Err(EventBusError::Disposed)
        ));
        assert!(matches!(
            bus.unsubscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
                .await,
            Err(EventBusError::Disposed)
        ));
    }
}
