//! Response delivery from the prompt back to the requester.
//!
//! Which path is used depends on how the prompt was started and is fixed
//! when the relay is built: inside the extension responses go over the
//! internal message bus; a prompt opened as a detached window posts them
//! straight to the window that opened it.

use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use vaultline_types::ApprovalResponse;

/// Broadcast channel of opaque JSON messages.
#[derive(Debug, Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<Value>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.tx.subscribe()
    }

    /// Publish a message; returns how many subscribers received it.
    pub fn publish(&self, message: Value) -> usize {
        self.tx.send(message).unwrap_or(0)
    }
}

/// The window that opened a detached prompt.
#[derive(Debug)]
pub struct OpenerWindow {
    messages: MessageBus,
}

impl OpenerWindow {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            messages: MessageBus::new(capacity),
        })
    }

    /// Messages posted to this window.
    pub fn messages(&self) -> &MessageBus {
        &self.messages
    }

    pub fn post_message(&self, message: Value) -> usize {
        self.messages.publish(message)
    }
}

/// Where the prompt sends its responses.
#[derive(Debug, Clone)]
pub enum ResponseRelay {
    /// Extension-internal message bus.
    Extension(MessageBus),
    /// Direct reference to the opener window. A closed opener drops responses.
    Opener(Weak<OpenerWindow>),
}

impl ResponseRelay {
    pub fn opener(window: &Arc<OpenerWindow>) -> Self {
        Self::Opener(Arc::downgrade(window))
    }

    /// Send `response` to the requester.
    ///
    /// Delivery is fire-and-forget: if nobody is listening any more the
    /// response is dropped.
    pub fn deliver(&self, response: &ApprovalResponse) {
        let message = match serde_json::to_value(response) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("could not encode response {}: {}", response.id, e);
                return;
            }
        };
        let delivered = match self {
            Self::Extension(bus) => bus.publish(message),
            Self::Opener(window) => match window.upgrade() {
                Some(window) => window.post_message(message),
                None => 0,
            },
        };
        if delivered == 0 {
            log::debug!(
                "response {} ({:?}) dropped: no receiver",
                response.id,
                response.status
            );
        } else {
            log::debug!("response {} ({:?}) relayed", response.id, response.status);
        }
    }
}
