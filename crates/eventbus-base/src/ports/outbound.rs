//! Outbound (driven) ports for the event bus core.

use crate::domain::{HandlerId, HandlerInstance};

/// Supplies handler instances at dispatch time.
///
/// Must return `None` rather than fail when the handler is unknown; the
/// dispatch engine skips unresolvable handlers. Implementations may hand out
/// a fresh instance per call or a shared one.
pub trait HandlerResolver: Send + Sync {
    /// Resolve a live instance of the handler type behind `handler`.
    fn resolve(&self, handler: &HandlerId) -> Option<HandlerInstance>;
}
