//! # Handler Container
//!
//! Default [`HandlerResolver`]: a registry of handler providers keyed by
//! handler type.
//!
//! | Lifetime | Registration | Resolution |
//! |----------|--------------|------------|
//! | Singleton | `add_singleton(handler)` | Same `Arc` every time |
//! | Transient | `add_transient(factory)` | Factory called per dispatch |

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{HandlerId, HandlerInstance};
use crate::ports::HandlerResolver;

type Factory = Arc<dyn Fn() -> HandlerInstance + Send + Sync>;

#[derive(Clone)]
enum Provider {
    Singleton(HandlerInstance),
    Transient(Factory),
}

/// Handler instances and factories, keyed by handler type.
#[derive(Default)]
pub struct HandlerContainer {
    providers: RwLock<HashMap<TypeId, Provider>>,
}

impl HandlerContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared instance of `H`. Replaces any earlier provider.
    pub fn add_singleton<H>(&self, handler: H) -> &Self
    where
        H: Send + Sync + 'static,
    {
        self.insert::<H>(Provider::Singleton(Arc::new(handler)));
        self
    }

    /// Register a factory producing a fresh `H` per resolution.
    pub fn add_transient<H, F>(&self, factory: F) -> &Self
    where
        H: Send + Sync + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as HandlerInstance);
        self.insert::<H>(Provider::Transient(factory));
        self
    }

    /// Forget the provider for `H`. Returns true if one was registered.
    pub fn remove<H: 'static>(&self) -> bool {
        self.providers.write().remove(&TypeId::of::<H>()).is_some()
    }

    /// Returns true if a provider for `H` is registered.
    pub fn contains<H: 'static>(&self) -> bool {
        self.providers.read().contains_key(&TypeId::of::<H>())
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    fn insert<H: 'static>(&self, provider: Provider) {
        let handler = HandlerId::of::<H>();
        let replaced = self
            .providers
            .write()
            .insert(handler.type_id(), provider)
            .is_some();
        debug!(handler = %handler, replaced, "Handler provider registered");
    }
}

impl HandlerResolver for HandlerContainer {
    fn resolve(&self, handler: &HandlerId) -> Option<HandlerInstance> {
        // Clone out so a transient factory never runs under the lock.
        let provider = self.providers.read().get(&handler.type_id()).cloned()?;
        Some(match provider {
            Provider::Singleton(instance) => instance,
            Provider::Transient(factory) => factory(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Mailer {
        id: usize,
    }

    struct Auditor;

    #[test]
    fn test_singleton_resolves_same_instance() {
        let container = HandlerContainer::new();
        container.add_singleton(Mailer { id: 1 });

        let a = container.resolve(&HandlerId::of::<Mailer>()).unwrap();
        let b = container.resolve(&HandlerId::of::<Mailer>()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.downcast::<Mailer>().unwrap().id, 1);
    }

    #[test]
    fn test_transient_builds_per_resolution() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);

        let container = HandlerContainer::new();
        container.add_transient(move || Mailer {
            id: counter.fetch_add(1, Ordering::SeqCst),
        });

        let a = container.resolve(&HandlerId::of::<Mailer>()).unwrap();
        let b = container.resolve(&HandlerId::of::<Mailer>()).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_handler_resolves_none() {
        let container = HandlerContainer::new();
        container.add_singleton(Mailer { id: 0 });

        assert!(container.resolve(&HandlerId::of::<Auditor>()).is_none());
    }

    #[test]
    fn test_remove_provider() {
        let container = HandlerContainer::new();
        container.add_singleton(Auditor);
        assert!(container.contains::<Auditor>());
        assert_eq!(container.len(), 1);

        assert!(container.remove::<Auditor>());
        assert!(!container.remove::<Auditor>());
        assert!(container.is_empty());
    }
}
