//! Error taxonomy for supervision, health probing and conversion.
//!
//! Supervisor errors are logged and reduced to the published `running` /
//! `healthy` flags; they never terminate the host application.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::LaunchRole;

/// Errors raised while starting or observing the server process.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// The executable, entry script or working directory is absent.
    /// Fatal for the current attempt; never retried automatically.
    #[error("Launch target missing: {role} not found at {}", .path.display())]
    LaunchTargetMissing { role: LaunchRole, path: PathBuf },

    /// The OS refused to spawn the process.
    #[error("Failed to launch {}: {message} (kind: {kind:?}, os error: {code:?})", .executable.display())]
    LaunchFailure {
        executable: PathBuf,
        kind: std::io::ErrorKind,
        code: Option<i32>,
        message: String,
    },

    /// The fixed port is still bound by another process after reconciliation.
    #[error("Port {port} is still held by {holders}")]
    PortConflict { port: u16, holders: String },

    /// The process exited without being asked to.
    #[error("Server process {pid} exited unexpectedly ({})", describe_exit(.code, .signal))]
    ProcessCrashed {
        pid: u32,
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl SupervisorError {
    /// Build a `LaunchFailure` from the OS error, keeping its code.
    pub fn launch_failure(executable: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::LaunchFailure {
            executable: executable.into(),
            kind: err.kind(),
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "unknown status".to_string(),
    }
}

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Why a single health probe failed.
///
/// Only used for logging; callers see `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthProbeError {
    #[error("Health check timed out after {0}s")]
    Timeout(u64),

    #[error("Health check transport error: {0}")]
    Transport(String),

    #[error("Health check returned status {0} (expected 200)")]
    Status(u16),

    #[error("Health check body mismatch: {0}")]
    Contract(String),
}

/// Errors from a single conversion request.
///
/// Reported per file; never fatal to the supervisor.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion request failed: {0}")]
    Transport(String),

    #[error("Conversion failed with status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Malformed conversion response: {0}")]
    MalformedResponse(String),
}
