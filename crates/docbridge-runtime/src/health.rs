//! HTTP health probing for the server process.
//!
//! A probe is one `GET /health` with a hard timeout. The server is healthy
//! only if it answers exactly `200` with a JSON body whose `status` field is
//! `"ok"`; anything else (other status, other body, timeout, refused
//! connection) is unhealthy.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use docbridge_core::{HealthProbeError, HealthStatus, ServiceEndpoint};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
}

/// Last recorded result, tagged with the reset epoch it belongs to.
#[derive(Debug, Default)]
struct Recorded {
    status: HealthStatus,
    epoch: u64,
}

/// Serialized health prober.
///
/// A probe holds the async `in_flight` guard for its whole duration, so
/// overlapping callers queue (FIFO) instead of racing requests at the
/// server. The recorded status sits behind its own lock so
/// [`reset`](Self::reset) never waits on a probe.
#[derive(Debug)]
pub struct HealthMonitor {
    client: Client,
    endpoint: ServiceEndpoint,
    timeout: Duration,
    in_flight: Mutex<()>,
    recorded: StdMutex<Recorded>,
}

impl HealthMonitor {
    pub fn new(endpoint: ServiceEndpoint, timeout: Duration) -> Self {
        // Loopback only; never route probes through a proxy from the environment
        let client = Client::builder().no_proxy().build().unwrap_or_default();
        Self {
            client,
            endpoint,
            timeout,
            in_flight: Mutex::new(()),
            recorded: StdMutex::new(Recorded::default()),
        }
    }

    pub const fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Probe once and record the result.
    ///
    /// A result that straddles a [`reset`](Self::reset) is returned but not
    /// recorded.
    pub async fn check(&self) -> bool {
        let _in_flight = self.in_flight.lock().await;
        let epoch = self.lock_recorded().epoch;

        let result = self.probe().await;
        let healthy = result.is_ok();

        let changed = {
            let mut recorded = self.lock_recorded();
            if recorded.epoch != epoch {
                debug!(healthy, "Discarding health result from before reset");
                return healthy;
            }
            recorded.status.record(healthy, Utc::now())
        };

        if changed {
            match &result {
                Ok(()) => info!(url = %self.endpoint.health_url(), "Server is healthy"),
                Err(e) => warn!(url = %self.endpoint.health_url(), error = %e, "Server is unhealthy"),
            }
        } else if let Err(e) = &result {
            debug!(error = %e, "Health check still failing");
        }

        healthy
    }

    /// Run [`check`](Self::check) on a background task and hand the result
    /// to `on_done`.
    pub fn check_detached<F>(self: &Arc<Self>, on_done: F) -> JoinHandle<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let healthy = monitor.check().await;
            on_done(healthy);
        })
    }

    /// Last recorded result.
    pub fn status(&self) -> HealthStatus {
        self.lock_recorded().status
    }

    /// Forget the recorded result, for when the probed process is gone.
    ///
    /// The next recorded probe counts as a change and is logged.
    pub fn reset(&self) {
        let mut recorded = self.lock_recorded();
        recorded.status = HealthStatus::unknown();
        recorded.epoch += 1;
    }

    fn lock_recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One request against the health contract, without recording anything.
    pub async fn probe(&self) -> Result<(), HealthProbeError> {
        let response = self
            .client
            .get(self.endpoint.health_url())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(HealthProbeError::Status(status.as_u16()));
        }

        let body: HealthBody = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error()
            } else {
                HealthProbeError::Contract(e.to_string())
            }
        })?;

        match body.status.as_deref() {
            Some("ok") => Ok(()),
            other => Err(HealthProbeError::Contract(format!(
                "expected status \"ok\", got {other:?}"
            ))),
        }
    }

    fn classify(&self, err: &reqwest::Error) -> HealthProbeError {
        if err.is_timeout() {
            self.timeout_error()
        } else {
            HealthProbeError::Transport(err.to_string())
        }
    }

    const fn timeout_error(&self) -> HealthProbeError {
        HealthProbeError::Timeout(self.timeout.as_secs())
    }
}
