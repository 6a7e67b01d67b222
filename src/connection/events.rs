//! Thin wrapper around a broadcast channel for `Connection::events`.
//! A broadcast channel (rather than a `Vec` of registered callbacks) means a
//! slow or absent listener can never block delivery to others, and
//! subscribing after some events have already fired just means missing
//! those, not erroring.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::connection::state::Event;
use crate::error::Error;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { sender }
    }
}

impl EventBus {
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Fire-and-forget: `send` only errors when there are no receivers,
    /// which is an expected and harmless case here.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// The error listener SPEC_FULL.md's policy section calls for: non-fatal
/// conditions (slow consumers, non-fatal `-ERR` lines) that are worth
/// reporting but must not be raised synchronously to an unrelated caller of
/// `publish`/`subscribe`. Kept separate from `EventBus` since its payload set
/// is open-ended (any `Error`), unlike the fixed lifecycle `Event` enum.
pub struct ErrorBus {
    sender: broadcast::Sender<Arc<Error>>,
}

impl Default for ErrorBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        ErrorBus { sender }
    }
}

impl ErrorBus {
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Error>> {
        self.sender.subscribe()
    }

    pub fn emit(&self, error: Error) {
        let _ = self.sender.send(Arc::new(error));
    }
}
