//! Process supervision for the docbridge conversion server.
//!
//! The desktop client does all real work through a local HTTP server. This
//! crate owns that server's lifecycle:
//!
//! - [`Supervisor`] - start/stop/health state machine, published via a
//!   `watch` channel of [`SupervisorSnapshot`](docbridge_core::SupervisorSnapshot)
//! - [`process`] - port reconciliation, launch, output drains, shutdown
//! - [`HealthMonitor`] / [`HealthSchedule`] - serialized probes and their timing
//! - [`ConvertClient`] - the `POST /convert` upload client
//!
//! ```no_run
//! use docbridge_core::SupervisorSettings;
//! use docbridge_runtime::{Supervisor, SupervisorConfig, init_tracing};
//!
//! # async fn run() -> anyhow::Result<()> {
//! init_tracing()?;
//! let config = SupervisorConfig::from_settings(&SupervisorSettings::from_env()?)?;
//! let supervisor = Supervisor::new(config);
//! supervisor.start().await?;
//! // ...
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

mod config;
mod convert;
mod health;
pub mod health_monitor;
pub mod process;
mod supervisor;
mod telemetry;

pub use config::{DEFAULT_SETTLE_TIMEOUT, SupervisorConfig};
pub use convert::{
    ConversionOutput, ConvertClient, ConvertOptions, MAX_ERROR_DETAIL_CHARS, TableMode,
    error_detail, markdown_file_name, parse_success,
};
pub use health::HealthMonitor;
pub use health_monitor::HealthSchedule;
pub use process::{
    OutputLog, OutputLogEntry, PortInspector, PortReconciler, ProcessSignaller, ReconcileReport,
    ShutdownOutcome, SupervisorEventBroadcaster,
};
pub use supervisor::{StartOutcome, Supervisor, SupervisorBuilder};
pub use telemetry::{DEFAULT_LOG_FILTER, init_tracing};
