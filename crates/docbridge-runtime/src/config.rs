//! Resolved supervisor configuration.

use std::path::Path;
use std::time::Duration;

use docbridge_core::{
    LaunchTarget, ServiceEndpoint, SettingsError, SupervisorSettings, validate_settings,
};

use crate::process::DEFAULT_RECONCILE_DELAY;

/// How long `stop()` waits for the process to be reaped after SIGKILL.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the supervisor needs, with defaults applied.
///
/// Built from [`SupervisorSettings`] or directly in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub endpoint: ServiceEndpoint,
    pub target: LaunchTarget,
    /// Delay between a successful spawn and the first probe.
    pub warmup: Duration,
    /// `None` disables periodic probes after the first one.
    pub health_interval: Option<Duration>,
    pub probe_timeout: Duration,
    /// Wait after SIGTERM before escalating.
    pub grace: Duration,
    /// Wait after SIGKILL.
    pub settle: Duration,
    /// Wait between SIGTERM and re-check when clearing the port.
    pub reconcile_delay: Duration,
}

impl SupervisorConfig {
    /// Defaults for the standard bundle layout under `backend_dir`.
    pub fn for_backend(backend_dir: &Path) -> Self {
        let settings = SupervisorSettings::with_defaults();
        Self::resolve(&settings, LaunchTarget::for_backend(backend_dir))
    }

    /// Validate `settings` and resolve every effective value.
    pub fn from_settings(settings: &SupervisorSettings) -> Result<Self, SettingsError> {
        validate_settings(settings)?;
        let target = LaunchTarget::for_backend(&settings.effective_backend_dir());
        Ok(Self::resolve(settings, target))
    }

    fn resolve(settings: &SupervisorSettings, target: LaunchTarget) -> Self {
        Self {
            endpoint: settings.effective_endpoint(),
            target,
            warmup: settings.effective_warmup(),
            health_interval: settings.effective_health_interval(),
            probe_timeout: settings.effective_probe_timeout(),
            grace: settings.effective_grace_timeout(),
            settle: DEFAULT_SETTLE_TIMEOUT,
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: ServiceEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: LaunchTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub const fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    #[must_use]
    pub const fn with_health_interval(mut self, interval: Option<Duration>) -> Self {
        self.health_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_stop_timeouts(mut self, grace: Duration, settle: Duration) -> Self {
        self.grace = grace;
        self.settle = settle;
        self
    }

    #[must_use]
    pub const fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay = delay;
        self
    }
}
