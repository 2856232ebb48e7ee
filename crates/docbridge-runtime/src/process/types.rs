//! Shared types for process management.

use chrono::{DateTime, Utc};
use docbridge_core::ExitInfo;
use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::shutdown::deliver_signal;

/// Signals the supervisor can ask the watcher to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// SIGTERM on Unix; a hard kill elsewhere.
    Terminate,
    /// SIGKILL.
    Kill,
}

/// The supervised child process.
///
/// The `Child` handle itself is owned by a watcher task that waits for exit
/// and delivers signals. Routing signals through the task that reaps the
/// process means a signal can never hit a recycled pid.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: u32,
    generation: u64,
    started_at: DateTime<Utc>,
    signals: mpsc::UnboundedSender<ProcessSignal>,
    exit: watch::Receiver<Option<ExitInfo>>,
}

impl ManagedProcess {
    /// Hand `child` to a watcher task.
    ///
    /// `on_exit` runs on the watcher task after the exit status has been
    /// published, whether the process was stopped or died on its own.
    pub(crate) fn watch<F, Fut>(mut child: Child, pid: u32, generation: u64, on_exit: F) -> Self
    where
        F: FnOnce(ExitInfo) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(signal) = signal_rx.recv() => {
                        if let Err(e) = deliver_signal(&mut child, signal) {
                            warn!(pid = %pid, ?signal, error = %e, "Failed to signal server process");
                        }
                    }
                }
            };

            let info = exit_info(pid, status);
            debug!(pid = %pid, generation = %generation, ?info, "Server process exited");
            exit_tx.send_replace(Some(info));
            on_exit(info).await;
        });

        Self {
            pid,
            generation,
            started_at: Utc::now(),
            signals: signal_tx,
            exit: exit_rx,
        }
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Spawn counter value this process was created with.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the process has not yet been reaped.
    pub fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Exit status, once the process is gone.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    /// Ask the watcher to deliver `signal`.
    ///
    /// Returns `false` if the watcher has already finished.
    pub fn signal(&self, signal: ProcessSignal) -> bool {
        self.signals.send(signal).is_ok()
    }

    /// Wait up to `limit` for the process to exit.
    pub async fn wait_for_exit(&self, limit: Duration) -> Option<ExitInfo> {
        let mut exit = self.exit.clone();
        match tokio::time::timeout(limit, exit.wait_for(Option::is_some)).await {
            Ok(Ok(info)) => *info,
            // Watcher gone without publishing; treat the last value as final
            Ok(Err(_)) => *self.exit.borrow(),
            Err(_) => None,
        }
    }
}

fn exit_info(pid: u32, status: io::Result<ExitStatus>) -> ExitInfo {
    match status {
        Ok(status) => ExitInfo {
            pid,
            code: status.code(),
            signal: exit_signal(&status),
        },
        Err(e) => {
            warn!(pid = %pid, error = %e, "Failed to collect exit status");
            ExitInfo {
                pid,
                code: None,
                signal: None,
            }
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
