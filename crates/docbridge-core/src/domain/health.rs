//! Last known health of the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of the most recent health probe.
///
/// Last-write-wins; no history is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Whether the last probe succeeded.
    pub healthy: bool,
    /// When the last probe completed (`None` = never probed).
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthStatus {
    /// Status before any probe has run.
    pub const fn unknown() -> Self {
        Self {
            healthy: false,
            checked_at: None,
        }
    }

    /// Record a probe result.
    ///
    /// Returns `true` when the healthy flag flipped, or when this is the
    /// first recorded probe.
    pub fn record(&mut self, healthy: bool, at: DateTime<Utc>) -> bool {
        let changed = self.checked_at.is_none() || self.healthy != healthy;
        self.healthy = healthy;
        self.checked_at = Some(at);
        changed
    }
}
