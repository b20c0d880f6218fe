//! Type-dispatch router: decodes a framed message, hands the payload to
//! the registered handler for its type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use p2p_types::{MessageType, PeerId};

use crate::errors::ProtocolError;

/// A message handler. Must be non-blocking relative to other peers: it
/// runs on the dispatching peer's own worker, but a slow handler delays
/// only that peer's subsequent inbound messages, never another's.
pub trait Handler: Send + Sync {
    fn handle(&self, peer: PeerId, payload: &[u8]) -> Result<(), ProtocolError>;
}

impl<F> Handler for F
where
    F: Fn(PeerId, &[u8]) -> Result<(), ProtocolError> + Send + Sync,
{
    fn handle(&self, peer: PeerId, payload: &[u8]) -> Result<(), ProtocolError> {
        self(peer, payload)
    }
}

/// Registered per message type. Looking up an unregistered type is not an
/// error at this layer — the caller logs and drops, per the router's
/// failure semantics.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<MessageType, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, msg_type: MessageType, handler: Arc<dyn Handler>) {
        self.handlers.write().insert(msg_type, handler);
    }

    pub fn get(&self, msg_type: MessageType) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(&msg_type).cloned()
    }

    /// Dispatches to the registered handler. `Ok(false)` means no handler
    /// was registered (logged and dropped by the caller); `Ok(true)` means
    /// a handler ran successfully; `Err` propagates a handler failure,
    /// which the caller maps to a disconnect.
    pub fn dispatch(&self, msg_type: MessageType, peer: PeerId, payload: &[u8]) -> Result<bool, ProtocolError> {
        match self.get(msg_type) {
            Some(handler) => handler.handle(peer, payload).map(|()| true),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registered_handler_is_invoked() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        registry.register(
            MessageType::Ping,
            Arc::new(move |_peer: PeerId, _payload: &[u8]| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let ran = registry.dispatch(MessageType::Ping, PeerId::new([1; 32]), &[]).unwrap();
        assert!(ran);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_handler_is_reported_without_erroring() {
        let registry = HandlerRegistry::new();
        let ran = registry.dispatch(MessageType::Block, PeerId::new([1; 32]), &[]).unwrap();
        assert!(!ran);
    }

    #[test]
    fn handler_error_propagates() {
        let registry = HandlerRegistry::new();
        registry.register(
            MessageType::Tx,
            Arc::new(|_peer: PeerId, _payload: &[u8]| Err(ProtocolError::Malformed("bad tx".to_string()))),
        );
        let result = registry.dispatch(MessageType::Tx, PeerId::new([1; 32]), &[]);
        assert!(result.is_err());
    }
}
