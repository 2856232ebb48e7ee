//! Server lifecycle phases, snapshots and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::HealthStatus;

/// Lifecycle phase of the supervised server.
///
/// ```text
/// Idle -> PortClearing -> Launching -> Running -> Healthy | Unhealthy
///                                          \-> Terminating -> Terminated
/// ```
///
/// A crash moves any running phase straight to `Terminated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorPhase {
    #[default]
    Idle,
    PortClearing,
    Launching,
    /// Spawned, health not yet known.
    Running,
    Healthy,
    Unhealthy,
    Terminating,
    Terminated,
}

impl SupervisorPhase {
    /// Whether the process is expected to be alive in this phase.
    ///
    /// `Terminating` counts: the child is still up during the grace window.
    pub const fn is_running(self) -> bool {
        matches!(
            self,
            Self::Running | Self::Healthy | Self::Unhealthy | Self::Terminating
        )
    }
}

/// How the process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

/// Published supervisor state.
///
/// Every externally visible change is one atomic replacement of this value,
/// so `running` and `healthy` are never observed out of step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSnapshot {
    pub phase: SupervisorPhase,
    pub running: bool,
    /// Only ever true while `running` is true.
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<ExitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the current process was last probed (`None` = not yet).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_checked_at: Option<DateTime<Utc>>,
    /// Unix timestamp in milliseconds when this state was recorded.
    pub updated_at: u64,
}

impl SupervisorSnapshot {
    /// Initial state: nothing launched.
    pub fn idle() -> Self {
        Self {
            phase: SupervisorPhase::Idle,
            running: false,
            healthy: false,
            pid: None,
            last_exit: None,
            last_error: None,
            health_checked_at: None,
            updated_at: now_ms(),
        }
    }

    /// Move to a new phase, keeping the flags consistent with it.
    pub fn transition(&mut self, phase: SupervisorPhase) {
        self.phase = phase;
        self.running = phase.is_running();
        self.healthy = phase == SupervisorPhase::Healthy;
        if !self.running {
            self.pid = None;
            self.health_checked_at = None;
        }
        self.updated_at = now_ms();
    }

    /// Mark the process as spawned.
    pub fn launched(&mut self, pid: u32) {
        self.transition(SupervisorPhase::Running);
        self.pid = Some(pid);
        self.last_error = None;
        self.health_checked_at = None;
    }

    /// Mark the process as gone.
    pub fn terminated(&mut self, exit: Option<ExitInfo>) {
        self.transition(SupervisorPhase::Terminated);
        if exit.is_some() {
            self.last_exit = exit;
        }
    }

    /// Apply a probe result that completed at `checked_at`.
    ///
    /// Ignored unless the process is running and not being stopped.
    /// Returns the health that was actually published.
    pub fn apply_health(&mut self, healthy: bool, checked_at: DateTime<Utc>) -> bool {
        if !self.running || self.phase == SupervisorPhase::Terminating {
            return false;
        }
        let phase = if healthy {
            SupervisorPhase::Healthy
        } else {
            SupervisorPhase::Unhealthy
        };
        if self.phase != phase {
            self.transition(phase);
        }
        self.health_checked_at = Some(checked_at);
        self.healthy
    }

    /// Published health as a flag plus the last probe time.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: self.healthy,
            checked_at: self.health_checked_at,
        }
    }
}

impl Default for SupervisorSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Discrete lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SupervisorEvent {
    /// Published state changed.
    StateChanged(SupervisorSnapshot),

    /// The process exited without being asked to.
    Crashed(ExitInfo),

    /// A start attempt failed before a process was running.
    LaunchFailed { message: String },

    /// The port reconciler had to clear a foreign listener.
    PortReclaimed { port: u16, pid: u32, forced: bool },
}

impl SupervisorEvent {
    pub fn state_changed(snapshot: &SupervisorSnapshot) -> Self {
        Self::StateChanged(snapshot.clone())
    }

    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
        }
    }
}
