//! Broadcast hub for fanning out change events to WebSocket clients

use super::{BroadcastMessage, ChangeEvent, EventEmitter, ACTIVITY_LOG_EVENT};
use tokio::sync::broadcast;
use tracing::debug;

/// In-process fan-out point distributing [`BroadcastMessage`]s via
/// `tokio::sync::broadcast`.
///
/// Fire-and-forget: emitting never blocks, never panics, never reports a
/// delivery result. If no subscribers are connected the message is dropped;
/// subscribers connecting later never receive it retroactively.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl EventBus {
    /// Default broadcast channel capacity
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive messages (one receiver per WebSocket client)
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Push an activity-log entry to all clients under the fixed
    /// `activity_log_update` event name.
    pub fn emit_activity_log(&self, entry: serde_json::Value) {
        self.send(BroadcastMessage::new(ACTIVITY_LOG_EVENT, entry));
    }

    fn send(&self, message: BroadcastMessage) {
        let event = message.event.clone();
        match self.sender.send(message) {
            Ok(n) => {
                debug!(event = %event, subscribers = n, "broadcast message emitted");
            }
            Err(_) => {
                // No subscribers — expected and fine
            }
        }
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: ChangeEvent) {
        self.send(BroadcastMessage::from(event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
