//! Signal foreign processes by PID (no `Child` handle available).
//!
//! Used by the port reconciler to clear listeners left behind by an earlier
//! run. These processes are not ours to reap.

use std::io;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
use sysinfo::{ProcessStatus, ProcessesToUpdate, System};

/// Signal delivery to arbitrary processes.
///
/// Abstracted so the reconciler's escalation policy can be tested without
/// touching real processes.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessSignaller: Send + Sync {
    /// Ask `pid` to exit (SIGTERM).
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Force `pid` to exit (SIGKILL).
    fn kill(&self, pid: u32) -> io::Result<()>;

    /// Whether `pid` is still running. Zombies count as gone.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Signaller backed by `nix` for delivery and `sysinfo` for liveness.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSignaller;

impl ProcessSignaller for SystemSignaller {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        send(pid, Signal::SIGTERM)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        send(pid, Signal::SIGKILL)
    }

    fn is_alive(&self, pid: u32) -> bool {
        if !pid_exists(pid) {
            return false;
        }

        let mut system = System::new();
        let target = sysinfo::Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        // kill(0) already saw the pid; if sysinfo lost the race, trust kill
        system.process(target).is_none_or(|process| {
            !matches!(
                process.status(),
                ProcessStatus::Zombie | ProcessStatus::Dead
            )
        })
    }
}

#[cfg(unix)]
fn send(pid: u32, sig: Signal) -> io::Result<()> {
    match signal::kill(Pid::from_raw(pid as i32), sig) {
        // Already gone
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(not(unix))]
#[derive(Debug, Clone, Copy)]
enum Signal {
    SIGTERM,
    SIGKILL,
}

#[cfg(not(unix))]
fn send(_pid: u32, _sig: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "signalling foreign processes is not implemented on this platform",
    ))
}

/// Check if a PID exists (without verifying what it is).
///
/// Uses `kill` with the null signal, which checks existence without
/// delivering anything.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        // Exists but we lack permission
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub fn pid_exists(pid: u32) -> bool {
    let mut system = System::new();
    let target = sysinfo::Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).is_some()
}
