use serde::{Deserialize, Serialize};
use std::fmt;

/// A foreign process found listening on the server's fixed port.
///
/// Only lives for the duration of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortOccupant {
    pub pid: u32,
    /// Process name, when the OS reports one.
    pub name: Option<String>,
}

impl PortOccupant {
    pub fn new(pid: u32, name: Option<String>) -> Self {
        Self { pid, name }
    }
}

impl fmt::Display for PortOccupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} (pid {})", self.pid),
            None => write!(f, "pid {}", self.pid),
        }
    }
}
