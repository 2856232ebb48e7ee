//! Event emitter trait for supervisor notifications.
//!
//! Implementations handle transport details (channels, UI bridges, logging).

use crate::events::SupervisorEvent;

/// Trait for emitting supervisor events.
///
/// Keeps channel types out of the public API surface and lets a UI layer
/// bind to lifecycle changes without knowing about the runtime.
///
/// # Implementations
///
/// - `NoopEmitter` - for tests and hosts that only read snapshots
/// - `SupervisorEventBroadcaster` in `docbridge-runtime`
pub trait SupervisorEventEmitter: Send + Sync {
    /// Emit a supervisor event.
    ///
    /// Called from background tasks; must not block.
    fn emit(&self, event: SupervisorEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn SupervisorEventEmitter>;
}

/// Emitter that discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl SupervisorEventEmitter for NoopEmitter {
    fn emit(&self, _event: SupervisorEvent) {}

    fn clone_box(&self) -> Box<dyn SupervisorEventEmitter> {
        Box::new(self.clone())
    }
}
