//! Domain types for the supervised conversion server.
//!
//! These are pure data types with no process or network behaviour attached.

mod endpoint;
mod health;
mod launch;
mod occupant;

pub use endpoint::{CONVERT_PATH, DEFAULT_HOST, DEFAULT_PORT, HEALTH_PATH, ServiceEndpoint};
pub use health::HealthStatus;
pub use launch::{LaunchRole, LaunchTarget};
pub use occupant::PortOccupant;
