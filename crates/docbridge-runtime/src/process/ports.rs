//! Fixed-port reconciliation.
//!
//! The server always binds the same port, so a listener left over from an
//! earlier run (or a crashed client) would make the new process fail to
//! bind. Before every launch the reconciler asks the OS who owns the port
//! and clears anything that is not us.

use std::collections::BTreeSet;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use docbridge_core::{DEFAULT_HOST, PortOccupant, SupervisorError};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::shutdown::{ProcessSignaller, SystemSignaller};

/// Delay between SIGTERM and the liveness re-check.
pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(500);

/// Check if a port is available by attempting to bind to it on `host`.
/// The listener is dropped immediately, releasing the port.
pub fn is_port_available(host: &str, port: u16) -> bool {
    match TcpListener::bind((host, port)) {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(_) => false,
    }
}

/// Failure to enumerate socket owners.
#[derive(Debug, Clone, Error)]
pub enum InspectError {
    #[error("Failed to list socket owners: {0}")]
    Listing(String),

    #[error("Port inspection task failed: {0}")]
    Join(String),
}

/// Answers "which processes are listening on this port?".
#[cfg_attr(test, mockall::automock)]
pub trait PortInspector: Send + Sync {
    fn occupants(&self, port: u16) -> Result<Vec<PortOccupant>, InspectError>;
}

/// Inspector backed by the OS socket tables (via `listeners`).
#[derive(Debug, Clone)]
pub struct SystemPortInspector {
    /// Address the server binds; used for the quick free-port check.
    host: String,
}

impl SystemPortInspector {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Default for SystemPortInspector {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl PortInspector for SystemPortInspector {
    fn occupants(&self, port: u16) -> Result<Vec<PortOccupant>, InspectError> {
        // Walking every socket is slow; skip it when the port is free
        if is_port_available(&self.host, port) {
            return Ok(Vec::new());
        }

        let listeners =
            listeners::get_all().map_err(|e| InspectError::Listing(e.to_string()))?;

        let mut seen = BTreeSet::new();
        let occupants = listeners
            .into_iter()
            .filter(|listener| listener.socket.port() == port)
            .filter(|listener| seen.insert(listener.process.pid))
            .map(|listener| {
                let name = Some(listener.process.name).filter(|n| !n.is_empty());
                PortOccupant::new(listener.process.pid, name)
            })
            .collect();
        Ok(occupants)
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub port: u16,
    /// Foreign listeners found before signalling (own pid excluded).
    pub found: Vec<PortOccupant>,
    /// Exited after SIGTERM.
    pub terminated: Vec<u32>,
    /// Needed SIGKILL.
    pub killed: Vec<u32>,
    /// Set when the port is still held afterwards.
    pub conflict: Option<SupervisorError>,
}

impl ReconcileReport {
    fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// True if nothing foreign holds the port any more.
    pub const fn is_clear(&self) -> bool {
        self.conflict.is_none()
    }
}

/// Clears stale listeners from the server port.
#[derive(Clone)]
pub struct PortReconciler {
    inspector: Arc<dyn PortInspector>,
    signaller: Arc<dyn ProcessSignaller>,
    delay: Duration,
    own_pid: u32,
}

impl PortReconciler {
    pub fn new(inspector: Arc<dyn PortInspector>, signaller: Arc<dyn ProcessSignaller>) -> Self {
        Self {
            inspector,
            signaller,
            delay: DEFAULT_RECONCILE_DELAY,
            own_pid: std::process::id(),
        }
    }

    /// Reconciler using the real socket tables and signals.
    pub fn system() -> Self {
        Self::new(
            Arc::new(SystemPortInspector::default()),
            Arc::new(SystemSignaller),
        )
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Clear every foreign listener on `port`.
    ///
    /// Never fails: inspection and signalling errors are logged and the
    /// launch goes ahead. A port that stays bound is reported through
    /// [`ReconcileReport::conflict`] and later shows up as unhealthy.
    pub async fn reconcile(&self, port: u16) -> ReconcileReport {
        let mut report = ReconcileReport::new(port);

        let occupants = match self.foreign_occupants(port).await {
            Ok(occupants) => occupants,
            Err(e) => {
                warn!(port = %port, error = %e, "Could not inspect port, launching anyway");
                return report;
            }
        };

        if occupants.is_empty() {
            debug!(port = %port, "Port is free");
            return report;
        }

        for occupant in &occupants {
            info!(port = %port, occupant = %occupant, "Terminating stale listener on server port");
            if let Err(e) = self.signaller.terminate(occupant.pid) {
                warn!(pid = %occupant.pid, error = %e, "Failed to send SIGTERM");
            }
        }

        sleep(self.delay).await;

        for occupant in &occupants {
            let pid = occupant.pid;
            if !self.signaller.is_alive(pid) {
                report.terminated.push(pid);
                continue;
            }

            warn!(pid = %pid, port = %port, "Stale listener ignored SIGTERM, sending SIGKILL");
            match self.signaller.kill(pid) {
                Ok(()) => report.killed.push(pid),
                Err(e) => warn!(pid = %pid, error = %e, "Failed to send SIGKILL"),
            }
        }
        report.found = occupants;

        if !report.killed.is_empty() {
            // Give the kernel a moment to release the socket
            sleep(self.delay).await;
        }

        match self.foreign_occupants(port).await {
            Ok(remaining) if !remaining.is_empty() => {
                let holders = remaining
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let conflict = SupervisorError::PortConflict { port, holders };
                warn!(port = %port, error = %conflict, "Port still in use after reconciliation");
                report.conflict = Some(conflict);
            }
            Ok(_) => {}
            Err(e) => debug!(port = %port, error = %e, "Could not re-inspect port"),
        }

        report
    }

    async fn foreign_occupants(&self, port: u16) -> Result<Vec<PortOccupant>, InspectError> {
        let inspector = Arc::clone(&self.inspector);
        let occupants = tokio::task::spawn_blocking(move || inspector.occupants(port))
            .await
            .map_err(|e| InspectError::Join(e.to_string()))??;

        let own_pid = self.own_pid;
        Ok(occupants
            .into_iter()
            .filter(|occupant| {
                if occupant.pid == own_pid {
                    debug!(pid = %own_pid, port = %port, "Skipping own process on server port");
                    false
                } else {
                    true
                }
            })
            .collect())
    }
}
