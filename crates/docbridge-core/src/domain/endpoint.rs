//! Network endpoint of the supervised server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;

/// Loopback address the server binds.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Fixed port the server binds.
pub const DEFAULT_PORT: u16 = 8765;

/// Health probe path.
pub const HEALTH_PATH: &str = "/health";

/// Document conversion path.
pub const CONVERT_PATH: &str = "/convert";

/// Immutable address of the supervised server.
///
/// Constructed once from settings and shared read-only by the supervisor,
/// the health monitor and the conversion client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    host: String,
    port: u16,
}

impl ServiceEndpoint {
    /// Create an endpoint for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint on the loopback interface.
    pub fn loopback(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 literals in brackets.
    pub fn authority(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `http://host:port` without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }

    pub fn health_url(&self) -> String {
        format!("{}{HEALTH_PATH}", self.base_url())
    }

    pub fn convert_url(&self) -> String {
        format!("{}{CONVERT_PATH}", self.base_url())
    }
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self::loopback(DEFAULT_PORT)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}
