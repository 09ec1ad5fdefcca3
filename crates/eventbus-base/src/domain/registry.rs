//! # Subscription Registry
//!
//! Owns the canonical-name → bindings map and the raw-name → event type map.
//!
//! ## Invariants
//!
//! - A name is present iff it has at least one binding.
//! - At most one binding per (canonical name, handler type).
//! - Bindings keep insertion order.
//! - An event type is registered while at least one of its bindings is live.
//! - Removing the last binding for a name fires the removal notification
//!   exactly once, outside the lock.
//!
//! All operations take a single internal mutex, so the registry can be
//! shared between dispatch workers and the thread issuing subscribe calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::errors::EventBusError;
use super::event::{EventType, IntegrationEvent};
use super::handler::IntegrationEventHandler;
use super::naming::EventNameNormalizer;
use super::subscription::SubscriptionInfo;

/// Callback fired with the canonical name when its last binding goes away.
pub type RemovalObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    handlers: HashMap<String, Vec<SubscriptionInfo>>,
    event_types: HashMap<String, EventType>,
}

/// In-memory subscription registry.
pub struct SubscriptionRegistry {
    normalizer: EventNameNormalizer,
    state: Mutex<RegistryState>,
    observers: RwLock<Vec<RemovalObserver>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry keyed by `normalizer`.
    pub fn new(normalizer: EventNameNormalizer) -> Self {
        Self {
            normalizer,
            state: Mutex::new(RegistryState::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Normaliser shared with the dispatch path.
    pub fn normalizer(&self) -> &EventNameNormalizer {
        &self.normalizer
    }

    /// Canonical key for event variant `E`.
    pub fn event_key<E: IntegrationEvent>(&self) -> String {
        self.normalizer.normalize(E::TYPE_NAME).to_string()
    }

    /// Register an observer for "event removed" notifications.
    pub fn on_event_removed<F>(&self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    /// Bind handler `H` to event `E`.
    ///
    /// Fails with [`EventBusError::DuplicateBinding`] when `H` is already
    /// bound to the canonical name of `E`.
    pub fn add_subscription<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        let event_name = self.event_key::<E>();
        let info = SubscriptionInfo::typed::<E, H>();

        let mut state = self.state.lock();
        let bindings = state.handlers.entry(event_name.clone()).or_default();

        if bindings.contains(&info) {
            // The entry existed already, so nothing to roll back.
            return Err(EventBusError::DuplicateBinding {
                event_name,
                handler: info.handler_id().short_name().to_string(),
            });
        }

        debug!(
            event_name = %event_name,
            handler = info.handler_id().short_name(),
            position = bindings.len(),
            "Binding added"
        );
        bindings.push(info);

        state
            .event_types
            .entry(E::TYPE_NAME.to_string())
            .or_insert_with(EventType::of::<E>);

        Ok(())
    }

    /// Remove the binding of handler `H` to event `E`.
    ///
    /// Returns `true` when this removed the last binding for the name (and
    /// the removal notification fired). Removing an unknown binding is a no-op.
    pub fn remove_subscription<E, H>(&self) -> bool
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        let event_name = self.event_key::<E>();
        let target = SubscriptionInfo::typed::<E, H>();

        let removed_name = {
            let mut state = self.state.lock();

            let Some(bindings) = state.handlers.get_mut(&event_name) else {
                warn!(event_name = %event_name, "No subscriptions to remove");
                return false;
            };
            let Some(position) = bindings.iter().position(|b| *b == target) else {
                warn!(
                    event_name = %event_name,
                    handler = target.handler_id().short_name(),
                    "Handler not bound, nothing removed"
                );
                return false;
            };

            bindings.remove(position);
            let type_still_bound = bindings
                .iter()
                .any(|b| b.event_type() == target.event_type());
            let name_empty = bindings.is_empty();

            if name_empty {
                state.handlers.remove(&event_name);
            }
            if !type_still_bound {
                state.event_types.remove(E::TYPE_NAME);
            }
            name_empty
        };

        debug!(
            event_name = %event_name,
            handler = target.handler_id().short_name(),
            "Binding removed"
        );

        if removed_name {
            self.raise_event_removed(&event_name);
        }
        removed_name
    }

    /// Returns true if `event_name` (canonical) has at least one binding.
    pub fn has_subscription_for_event(&self, event_name: &str) -> bool {
        self.state.lock().handlers.contains_key(event_name)
    }

    /// Typed form of [`has_subscription_for_event`](Self::has_subscription_for_event).
    pub fn has_subscription<E: IntegrationEvent>(&self) -> bool {
        self.has_subscription_for_event(&self.event_key::<E>())
    }

    /// Snapshot of the bindings for `event_name`, in registration order.
    pub fn handlers_for_event(
        &self,
        event_name: &str,
    ) -> Result<Vec<SubscriptionInfo>, EventBusError> {
        self.state
            .lock()
            .handlers
            .get(event_name)
            .cloned()
            .ok_or_else(|| EventBusError::SubscriptionNotFound(event_name.to_string()))
    }

    /// Typed form of [`handlers_for_event`](Self::handlers_for_event).
    pub fn handlers_for<E: IntegrationEvent>(&self) -> Result<Vec<SubscriptionInfo>, EventBusError> {
        self.handlers_for_event(&self.event_key::<E>())
    }

    /// Event type registered under its raw (unnormalised) name.
    pub fn event_type_by_name(&self, raw_name: &str) -> Option<EventType> {
        self.state.lock().event_types.get(raw_name).copied()
    }

    /// First registered event type whose canonical key is `event_name`.
    pub fn event_type_for_canonical(&self, event_name: &str) -> Option<EventType> {
        let state = self.state.lock();
        state
            .handlers
            .get(event_name)?
            .iter()
            .map(SubscriptionInfo::event_type)
            .find(|t| state.event_types.contains_key(t.name()))
    }

    /// Number of bindings for `event_name`.
    pub fn binding_count(&self, event_name: &str) -> usize {
        self.state
            .lock()
            .handlers
            .get(event_name)
            .map_or(0, Vec::len)
    }

    /// Canonical names with live bindings, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true if no name has bindings.
    pub fn is_empty(&self) -> bool {
        self.state.lock().handlers.is_empty()
    }

    /// Drop all bindings and event types. No notifications fire.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.handlers.clear();
        state.event_types.clear();
    }

    fn raise_event_removed(&self, event_name: &str) {
        let observers: Vec<RemovalObserver> = self.observers.read().clone();
        debug!(
            event_name = %event_name,
            observers = observers.len(),
            "Event removed"
        );
        for observer in observers {
            observer(event_name);
        }
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("event_names", &self.event_names())
            .finish()
    }
}
