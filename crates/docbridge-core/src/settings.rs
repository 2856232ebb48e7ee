//! Supervisor settings and validation.
//!
//! All fields are optional so a host can persist partial overrides; the
//! `effective_*` getters supply defaults. Environment variables override
//! whatever was loaded.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{DEFAULT_HOST, DEFAULT_PORT, ServiceEndpoint};

/// Delay between spawn and the first health probe.
pub const DEFAULT_WARMUP_MS: u64 = 3_000;

/// Interval between periodic health probes.
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 15;

/// Hard timeout of a single health probe.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// How long `stop()` waits after SIGTERM before escalating.
pub const DEFAULT_GRACE_TIMEOUT_SECS: u64 = 5;

/// Backend directory used when nothing else is configured.
pub const DEFAULT_BACKEND_DIR: &str = "backend";

pub const ENV_BACKEND_DIR: &str = "DOCBRIDGE_BACKEND_DIR";
pub const ENV_HOST: &str = "DOCBRIDGE_HOST";
pub const ENV_PORT: &str = "DOCBRIDGE_PORT";
pub const ENV_WARMUP_MS: &str = "DOCBRIDGE_WARMUP_MS";
pub const ENV_HEALTH_INTERVAL_SECS: &str = "DOCBRIDGE_HEALTH_INTERVAL_SECS";

/// Supervisor settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Root of the bundled backend (contains `venv/` and `main.py`).
    pub backend_dir: Option<String>,

    /// Host the server binds.
    pub host: Option<String>,

    /// Fixed port the server binds.
    pub port: Option<u16>,

    /// Milliseconds to wait after spawn before the first probe.
    pub warmup_ms: Option<u64>,

    /// Seconds between periodic probes; `0` disables periodic probing.
    pub health_interval_secs: Option<u64>,

    /// Seconds before a single probe is abandoned.
    pub probe_timeout_secs: Option<u64>,

    /// Seconds `stop()` waits after SIGTERM.
    pub grace_timeout_secs: Option<u64>,
}

impl SupervisorSettings {
    /// Create settings with the documented defaults filled in.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            backend_dir: None,
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            warmup_ms: Some(DEFAULT_WARMUP_MS),
            health_interval_secs: Some(DEFAULT_HEALTH_INTERVAL_SECS),
            probe_timeout_secs: Some(DEFAULT_PROBE_TIMEOUT_SECS),
            grace_timeout_secs: Some(DEFAULT_GRACE_TIMEOUT_SECS),
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::with_defaults();
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_BACKEND_DIR) {
            self.backend_dir = Some(dir);
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = Some(host);
        }
        if let Some(port) = parse_env(&lookup, ENV_PORT)? {
            self.port = Some(port);
        }
        if let Some(ms) = parse_env(&lookup, ENV_WARMUP_MS)? {
            self.warmup_ms = Some(ms);
        }
        if let Some(secs) = parse_env(&lookup, ENV_HEALTH_INTERVAL_SECS)? {
            self.health_interval_secs = Some(secs);
        }
        Ok(())
    }

    pub fn effective_backend_dir(&self) -> PathBuf {
        PathBuf::from(
            self.backend_dir
                .as_deref()
                .unwrap_or(DEFAULT_BACKEND_DIR),
        )
    }

    pub fn effective_endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::new(
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT),
        )
    }

    pub fn effective_warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms.unwrap_or(DEFAULT_WARMUP_MS))
    }

    /// `None` when periodic probing is disabled.
    pub fn effective_health_interval(&self) -> Option<Duration> {
        match self
            .health_interval_secs
            .unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn effective_probe_timeout(&self) -> Duration {
        Duration::from_secs(
            self.probe_timeout_secs
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
        )
    }

    pub fn effective_grace_timeout(&self) -> Duration {
        Duration::from_secs(
            self.grace_timeout_secs
                .unwrap_or(DEFAULT_GRACE_TIMEOUT_SECS),
        )
    }
}

fn parse_env<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::InvalidEnv { key, value: raw }),
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("Probe timeout must be between 1 and 300 seconds, got {0}")]
    InvalidProbeTimeout(u64),

    #[error("Grace timeout must be between 1 and 120 seconds, got {0}")]
    InvalidGraceTimeout(u64),

    #[error("Backend directory cannot be empty")]
    EmptyBackendDir,

    #[error("Host cannot be empty")]
    EmptyHost,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &SupervisorSettings) -> Result<(), SettingsError> {
    if let Some(port) = settings.port {
        if port < 1024 {
            return Err(SettingsError::InvalidPort(port));
        }
    }

    if let Some(secs) = settings.probe_timeout_secs {
        if !(1..=300).contains(&secs) {
            return Err(SettingsError::InvalidProbeTimeout(secs));
        }
    }

    if let Some(secs) = settings.grace_timeout_secs {
        if !(1..=120).contains(&secs) {
            return Err(SettingsError::InvalidGraceTimeout(secs));
        }
    }

    if settings
        .backend_dir
        .as_ref()
        .is_some_and(|p| p.trim().is_empty())
    {
        return Err(SettingsError::EmptyBackendDir);
    }

    if settings.host.as_ref().is_some_and(|h| h.trim().is_empty()) {
        return Err(SettingsError::EmptyHost);
    }

    Ok(())
}
