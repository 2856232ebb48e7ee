//! Tracing setup for host applications.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install a compact stdout subscriber driven by `RUST_LOG`.
///
/// Server output is logged at `debug` under `docbridge::backend`; enable it
/// with `RUST_LOG=info,docbridge::backend=debug`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()?;
    Ok(())
}
