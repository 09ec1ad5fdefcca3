//! # Naming Conventions
//!
//! Canonical event names drive message labels, subscription names and rule
//! names; the raw type name is rebuilt by framing on receive.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use eventbus_base::{
        EventBus, HandlerContainer, HandlerError, IntegrationEvent, IntegrationEventBase,
        IntegrationEventHandler, TrimStyle,
    };
    use eventbus_servicebus::{InMemoryServiceBus, ServiceBusConnection};
    use serde::{Deserialize, Serialize};

    use crate::integration::fixtures::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct EshopOrderShippedIntegrationEvent {
        #[serde(flatten)]
        base: IntegrationEventBase,
        tracking_number: String,
    }

    impl IntegrationEvent for EshopOrderShippedIntegrationEvent {
        const TYPE_NAME: &'static str = "EshopOrderShippedIntegrationEvent";

        fn base(&self) -> &IntegrationEventBase {
            &self.base
        }
    }

    struct TrackingHandler(Journal);

    #[async_trait]
    impl IntegrationEventHandler<EshopOrderShippedIntegrationEvent> for TrackingHandler {
        async fn handle(&self, event: EshopOrderShippedIntegrationEvent) -> Result<(), HandlerError> {
            self.0.lock().push(event.tracking_number);
            Ok(())
        }
    }

    /// Prefix and suffix are both stripped literally and framed back on receive.
    #[tokio::test]
    async fn test_prefix_and_suffix_round_trip() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(TrackingHandler(journal.clone()));
        let config = config_builder("Shipping")
            .event_name_prefix("Eshop")
            .trim_style(TrimStyle::Literal)
            .build()
            .unwrap();
        let (bus, reports) = connect(&broker, config, container).await;

        assert_eq!(
            bus.engine().event_name::<EshopOrderShippedIntegrationEvent>(),
            "OrderShipped"
        );

        bus.subscribe::<EshopOrderShippedIntegrationEvent, TrackingHandler>()
            .await
            .unwrap();
        assert_eq!(broker.subscription_names(TOPIC), vec!["Shipping.OrderShipped"]);
        assert_eq!(
            broker.rule_names(TOPIC, "Shipping.OrderShipped"),
            vec!["OrderShipped"]
        );

        bus.publish(EshopOrderShippedIntegrationEvent {
            base: IntegrationEventBase::new(),
            tracking_number: "1Z999".to_string(),
        })
        .await
        .unwrap();

        eventually("tracking handled", || journal.lock().len() == 1).await;
        assert_eq!(*journal.lock(), vec!["1Z999"]);
        assert!(reports.lock().is_empty());
    }

    /// With suffix stripping off, the full type name is the canonical name.
    #[tokio::test]
    async fn test_suffix_kept_when_disabled() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(RecordingOrderHandler {
            tag: "order",
            journal: journal.clone(),
        });
        let config = config_builder("Ordering").delete_suffix(false).build().unwrap();
        let (bus, _) = connect(&broker, config, container).await;

        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();
        assert_eq!(
            broker.subscription_names(TOPIC),
            vec!["Ordering.OrderCreatedIntegrationEvent"]
        );

        bus.publish(OrderCreatedIntegrationEvent::new(11))
            .await
            .unwrap();
        eventually("order handled", || journal.lock().len() == 1).await;
    }

    /// Raw labels carrying the suffix normalise to the same bindings.
    #[tokio::test]
    async fn test_raw_label_is_normalised_on_receive() {
        let broker = Arc::new(InMemoryServiceBus::new());
        let journal = Journal::default();
        let container = Arc::new(HandlerContainer::new());
        container.add_singleton(RecordingOrderHandler {
            tag: "order",
            journal: journal.clone(),
        });
        let (bus, _) = connect(&broker, config_builder("Ordering").build().unwrap(), container).await;
        bus.subscribe::<OrderCreatedIntegrationEvent, RecordingOrderHandler>()
            .await
            .unwrap();

        let payload = serde_json::to_vec(&OrderCreatedIntegrationEvent::new(21)).unwrap();
        let handled = bus
            .process_event("OrderCreatedIntegrationEvent", &payload)
            .await
            .unwrap();

        assert!(handled);
        assert_eq!(*journal.lock(), vec!["order:21"]);
        assert!(!bus.process_event("Unknown", &payload).await.unwrap());

        // Direct sends with a non-matching label never reach the subscription.
        broker
            .send(
                TOPIC,
                eventbus_servicebus::ServiceBusMessage::new("OrderCreatedIntegrationEvent", payload),
            )
            .await
            .unwrap();
        assert_eq!(broker.active_message_count(TOPIC, "Ordering.OrderCreated"), 0);
    }
}
