//! Typed event broadcaster (§9 "Event emitters → typed broadcasters").
//!
//! Wraps a `tokio::sync::broadcast` channel so listeners subscribe once and
//! receive every `HostEvent` variant, rather than registering per string
//! event name as the distilled source's `EventEmitter` does.

use mcphost_types::HostEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<HostEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBroadcaster {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to the event stream. Lagging subscribers drop the oldest
    /// events first — per §5, fan-out has no back-pressure guarantees.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. A `SendError` (no subscribers) is not a failure.
    pub fn emit(&self, event: HostEvent) {
        let _ = self.sender.send(event);
    }
}
