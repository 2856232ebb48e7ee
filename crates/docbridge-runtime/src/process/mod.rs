//! OS-level process plumbing for the supervisor.
//!
//! # Structure
//!
//! - `PortReconciler` - clears stale listeners from the fixed port
//! - `ProcessLauncher` - builds the command and environment, spawns, wires pipes
//! - `spawn_stream_reader` - drains stdout/stderr into an `OutputSinkPort`
//! - `ManagedProcess` - watcher-owned child handle with signal routing
//! - `shutdown` - SIGTERM -> SIGKILL escalation
//! - `OutputLog` / `SupervisorEventBroadcaster` - fan-out for UI layers

mod broadcaster;
mod launcher;
mod logs;
mod ports;
pub mod shutdown;
mod stream;
mod types;

pub use broadcaster::SupervisorEventBroadcaster;
pub use launcher::{LaunchedChild, ProcessLauncher, search_path};
pub use logs::{DEFAULT_MAX_LOG_LINES, OutputLog, OutputLogEntry};
pub use ports::{
    DEFAULT_RECONCILE_DELAY, InspectError, PortInspector, PortReconciler, ReconcileReport,
    SystemPortInspector, is_port_available,
};
pub use shutdown::{
    ProcessSignaller, ShutdownOutcome, SystemSignaller, pid_exists, shutdown_process,
};
pub use stream::{BACKEND_LOG_TARGET, spawn_stream_reader};
pub use types::{ManagedProcess, ProcessSignal};
