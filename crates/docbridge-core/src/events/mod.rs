//! Supervisor lifecycle events and published state.
//!
//! Consumers either hold a `SupervisorSnapshot` receiver (latest state only)
//! or register a `SupervisorEventEmitter` for discrete notifications.

mod supervisor;

pub use supervisor::{ExitInfo, SupervisorEvent, SupervisorPhase, SupervisorSnapshot};
