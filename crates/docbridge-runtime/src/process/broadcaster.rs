//! Supervisor event broadcasting.
//!
//! A `tokio::sync::broadcast` backed `SupervisorEventEmitter` for hosts that
//! want to fan events out to several listeners (UI bridge, SSE, logging).

use docbridge_core::{SupervisorEvent, SupervisorEventEmitter};
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast channel capacity for supervisor events
const CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for supervisor lifecycle events
#[derive(Clone)]
pub struct SupervisorEventBroadcaster {
    sender: broadcast::Sender<SupervisorEvent>,
}

impl SupervisorEventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to supervisor events
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SupervisorEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorEventEmitter for SupervisorEventBroadcaster {
    fn emit(&self, event: SupervisorEvent) {
        // Only log if there are receivers
        if self.sender.receiver_count() > 0 {
            debug!(?event, "Broadcasting supervisor event");
            let _ = self.sender.send(event);
        }
    }

    fn clone_box(&self) -> Box<dyn SupervisorEventEmitter> {
        Box::new(self.clone())
    }
}
