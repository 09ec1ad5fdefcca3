//! # Subscription Bindings
//!
//! A [`SubscriptionInfo`] binds one handler type to one canonical event name.
//! Equality is by handler identity only.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::errors::HandlerError;
use super::event::{DecodedEvent, EventType, IntegrationEvent};
use super::handler::IntegrationEventHandler;

/// A resolved handler instance, type-erased.
pub type HandlerInstance = Arc<dyn Any + Send + Sync>;

/// Future returned by a handler invocation.
pub type InvokeFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Opaque handler type token.
#[derive(Clone, Copy)]
pub struct HandlerId {
    type_id: TypeId,
    name: &'static str,
}

impl HandlerId {
    /// Token for handler type `H`.
    pub fn of<H: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: type_name::<H>(),
        }
    }

    /// Rust type id.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HandlerId {}

impl Hash for HandlerId {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

trait Invoke: Send + Sync {
    fn invoke(&self, instance: HandlerInstance, event: DecodedEvent) -> InvokeFuture;
}

struct TypedInvoker<E, H> {
    _marker: PhantomData<fn(E, H)>,
}

impl<E, H> Invoke for TypedInvoker<E, H>
where
    E: IntegrationEvent,
    H: IntegrationEventHandler<E>,
{
    fn invoke(&self, instance: HandlerInstance, event: DecodedEvent) -> InvokeFuture {
        let handler = match instance.downcast::<H>() {
            Ok(handler) => handler,
            Err(_) => {
                let msg = format!("resolved instance is not a {}", type_name::<H>());
                return async move { Err::<(), HandlerError>(msg.into()) }.boxed();
            }
        };
        let event = match event.downcast::<E>() {
            Ok(event) => *event,
            Err(_) => {
                let msg = format!("decoded payload is not a {}", E::TYPE_NAME);
                return async move { Err::<(), HandlerError>(msg.into()) }.boxed();
            }
        };
        async move { handler.handle(event).await }.boxed()
    }
}

/// One handler binding for one event name.
#[derive(Clone)]
pub struct SubscriptionInfo {
    handler: HandlerId,
    event_type: EventType,
    invoker: Arc<dyn Invoke>,
}

impl SubscriptionInfo {
    /// Binding of handler `H` to event variant `E`.
    pub fn typed<E, H>() -> Self
    where
        E: IntegrationEvent,
        H: IntegrationEventHandler<E>,
    {
        Self {
            handler: HandlerId::of::<H>(),
            event_type: EventType::of::<E>(),
            invoker: Arc::new(TypedInvoker::<E, H> {
                _marker: PhantomData,
            }),
        }
    }

    /// Handler identity.
    pub fn handler_id(&self) -> HandlerId {
        self.handler
    }

    /// Event variant the handler accepts.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Call the handler's `handle` with a decoded event.
    pub fn invoke(&self, instance: HandlerInstance, event: DecodedEvent) -> InvokeFuture {
        self.invoker.invoke(instance, event)
    }
}

impl PartialEq for SubscriptionInfo {
    fn eq(&self, other: &Self) -> bool {
        self.handler == other.handler
    }
}

impl Eq for SubscriptionInfo {}

impl fmt::Debug for SubscriptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionInfo")
            .field("handler", &self.handler)
            .field("event_type", &self.event_type)
            .finish()
    }
}
