//! Graceful shutdown of the managed process with SIGTERM → SIGKILL escalation.

use std::io;
use std::time::Duration;

use docbridge_core::ExitInfo;
use tokio::process::Child;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::process::types::{ManagedProcess, ProcessSignal};

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The process was already gone when shutdown started.
    AlreadyExited(Option<ExitInfo>),
    /// Exited within the grace period after SIGTERM.
    Graceful(ExitInfo),
    /// Needed SIGKILL. `None` if it had still not been reaped after the
    /// settle timeout.
    Forced(Option<ExitInfo>),
}

impl ShutdownOutcome {
    pub const fn exit_info(&self) -> Option<ExitInfo> {
        match self {
            Self::AlreadyExited(info) | Self::Forced(info) => *info,
            Self::Graceful(info) => Some(*info),
        }
    }
}

/// Shut down a managed process.
///
/// # Strategy
/// 1. Send SIGTERM and wait up to `grace` for exit
/// 2. If still running, send SIGKILL
/// 3. Wait up to `settle` for the watcher to reap it
///
/// Never fails: every path ends with the caller free to drop the handle.
pub async fn shutdown_process(
    process: &ManagedProcess,
    grace: Duration,
    settle: Duration,
) -> ShutdownOutcome {
    let pid = process.pid();

    if !process.is_alive() || !process.signal(ProcessSignal::Terminate) {
        return ShutdownOutcome::AlreadyExited(process.exit_info());
    }

    if let Some(info) = process.wait_for_exit(grace).await {
        debug!(pid = %pid, "Server process exited after SIGTERM");
        return ShutdownOutcome::Graceful(info);
    }

    warn!(
        pid = %pid,
        grace_secs = grace.as_secs_f32(),
        "Server process ignored SIGTERM, sending SIGKILL"
    );
    if !process.signal(ProcessSignal::Kill) {
        // Watcher finished between the timeout and now
        return ShutdownOutcome::Forced(process.exit_info());
    }

    let info = process.wait_for_exit(settle).await;
    if info.is_none() {
        warn!(pid = %pid, "Server process still not reaped after SIGKILL");
    }
    ShutdownOutcome::Forced(info)
}

/// Deliver `signal` to a child this task owns.
///
/// A child that has already been reaped has no pid; that is a no-op.
pub(crate) fn deliver_signal(child: &mut Child, signal: ProcessSignal) -> io::Result<()> {
    match signal {
        ProcessSignal::Terminate => terminate(child),
        ProcessSignal::Kill => child.start_kill(),
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    // Windows has no SIGTERM equivalent - terminate immediately
    child.start_kill()
}
