//! # Dispatch Engine
//!
//! Transport-agnostic core shared by every adapter: binding bookkeeping and
//! the `process_event` algorithm.
//!
//! ```text
//! raw label ──normalize──→ canonical name ──registry──→ [binding, ...]
//!                                                          │ in order
//!            resolve instance → resolve event type → decode → handle().await
//! ```
//!
//! Handlers for one event run sequentially in registration order. The first
//! handler failure stops the dispatch and propagates to the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EventBusConfig;
use crate::domain::{
    EventBusError, EventType, IntegrationEvent, IntegrationEventHandler, SubscriptionInfo,
    SubscriptionRegistry,
};
use crate::ports::HandlerResolver;

/// Shared dispatch core, owned by a transport adapter.
pub struct DispatchEngine {
    config: Arc<EventBusConfig>,
    registry: Arc<SubscriptionRegistry>,
    resolver: Arc<dyn HandlerResolver>,
    disposed: AtomicBool,
}

impl DispatchEngine {
    /// Build an engine with a fresh registry keyed by the configured naming rules.
    pub fn new(config: Arc<EventBusConfig>, resolver: Arc<dyn HandlerResolver>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(config.normalizer()));
        Self {
            config,
            registry,
            resolver,
            disposed: AtomicBool::new(false),
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &Arc<EventBusConfig> {
        &self.config
    }

    /// Subscription registry.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Canonical routing name for `E`.
    pub fn event_name<E: IntegrationEvent>(&self) -> String {
        self.registry.event_key::<E>()
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Record the binding of `H` to `E`.
    pub fn add_subscription<E, H>(&self) -> Result<(), EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        self.ensure_live()?;
        self.registry.add_subscription::<E, H>()
    }

    /// Drop the binding of `H` to `E`. Returns true if the name was removed.
    pub fn remove_subscription<E, H>(&self) -> Result<bool, EventBusError>
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        self.ensure_live()?;
        Ok(self.registry.remove_subscription::<E, H>())
    }

    /// Dispatch one raw `(label, payload)` pair to every bound handler.
    ///
    /// Returns `Ok(false)` without resolving or decoding anything when the
    /// canonical name has no bindings, `Ok(true)` once every bound handler
    /// has been attempted.
    pub async fn process_event(
        &self,
        raw_name: &str,
        payload: &[u8],
    ) -> Result<bool, EventBusError> {
        self.ensure_live()?;

        let normalizer = self.registry.normalizer();
        let event_name = normalizer.normalize(raw_name);

        if !self.registry.has_subscription_for_event(event_name) {
            debug!(raw_name, event_name, "No subscriptions, event ignored");
            return Ok(false);
        }

        // Unsubscribed between the check and the snapshot.
        let bindings = match self.registry.handlers_for_event(event_name) {
            Ok(bindings) => bindings,
            Err(EventBusError::SubscriptionNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let framed = normalizer.frame(event_name);

        for binding in &bindings {
            let handler = binding.handler_id();
            let Some(instance) = self.resolver.resolve(&handler) else {
                debug!(event_name, handler = %handler, "Handler not resolvable, skipped");
                continue;
            };

            let event_type = self.resolve_event_type(&framed, binding)?;
            let event = event_type.decode(payload)?;

            binding
                .invoke(instance, event)
                .await
                .map_err(|cause| {
                    warn!(event_name, handler = %handler, error = %cause, "Handler failed");
                    EventBusError::HandlerFailed {
                        event_name: event_name.to_string(),
                        handler: handler.short_name().to_string(),
                        cause: cause.to_string(),
                    }
                })?;

            debug!(event_name, handler = %handler, "Handler completed");
        }

        Ok(true)
    }

    /// Clear the registry. Later calls fail with [`EventBusError::Disposed`].
    ///
    /// Returns true on the first call only.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.clear();
        debug!("Dispatch engine disposed");
        true
    }

    fn ensure_live(&self) -> Result<(), EventBusError> {
        if self.is_disposed() {
            Err(EventBusError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Event type by framed raw name, falling back to the binding's own type
    /// when trimming removed more than the literal affixes.
    fn resolve_event_type(
        &self,
        framed: &str,
        binding: &SubscriptionInfo,
    ) -> Result<EventType, EventBusError> {
        let expected = binding.event_type();
        self.registry
            .event_type_by_name(framed)
            .filter(|found| *found == expected)
            .or_else(|| self.registry.event_type_by_name(expected.name()))
            .ok_or_else(|| EventBusError::EventTypeNotFound(framed.to_string()))
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("registry", &self.registry)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
