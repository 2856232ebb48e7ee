//! Process shutdown for the managed server and for stale port holders.
//!
//! Provides two strategies:
//! - `shutdown_process`: for the managed process (signals routed through its watcher)
//! - `ProcessSignaller`: for foreign processes found on the port (PID-only, no reaping)

mod child;
mod pid;

pub use child::{ShutdownOutcome, shutdown_process};
pub(crate) use child::deliver_signal;
#[cfg(test)]
pub use pid::MockProcessSignaller;
pub use pid::{ProcessSignaller, SystemSignaller, pid_exists};
