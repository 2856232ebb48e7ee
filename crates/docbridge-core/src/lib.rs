//! Core domain types and port definitions for docbridge.
//!
//! docbridge supervises the local document-conversion server that the desktop
//! client talks to over HTTP. This crate holds everything that is independent
//! of the OS and the async runtime:
//!
//! - `domain` - endpoint, launch target, health and port-occupant types
//! - `events` - lifecycle phases, published snapshots and discrete events
//! - `ports` - trait abstractions for event emission and output sinks
//! - `error` - the error taxonomy shared by the runtime adapters
//! - `settings` - user-facing configuration with validation
//!
//! The process supervisor itself lives in `docbridge-runtime`.

pub mod domain;
pub mod error;
pub mod events;
pub mod ports;
pub mod settings;

pub use domain::{
    CONVERT_PATH, DEFAULT_HOST, DEFAULT_PORT, HEALTH_PATH, HealthStatus, LaunchRole, LaunchTarget,
    PortOccupant, ServiceEndpoint,
};
pub use error::{ConversionError, HealthProbeError, SupervisorError, SupervisorResult};
pub use events::{ExitInfo, SupervisorEvent, SupervisorPhase, SupervisorSnapshot};
pub use ports::{
    NoopEmitter, NoopOutputSink, OutputChunk, OutputSinkPort, OutputStream,
    SupervisorEventEmitter,
};
pub use settings::{
    DEFAULT_GRACE_TIMEOUT_SECS, DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_WARMUP_MS, ENV_BACKEND_DIR, ENV_HEALTH_INTERVAL_SECS, ENV_HOST, ENV_PORT,
    ENV_WARMUP_MS, SettingsError, SupervisorSettings, validate_settings,
};
