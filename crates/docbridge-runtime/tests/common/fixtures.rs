//! Fake backend bundles.
//!
//! A bundle is a temp directory laid out like the real one
//! (`venv/bin/python` + `main.py`), where the "interpreter" is a shell
//! script whose behaviour each test chooses.

#![cfg(unix)]
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use docbridge_core::{PortOccupant, ServiceEndpoint};
use docbridge_runtime::process::InspectError;
use docbridge_runtime::{
    PortInspector, Supervisor, SupervisorConfig, SupervisorEventBroadcaster,
};
use tempfile::TempDir;

/// Runs until signalled.
pub const LONG_RUNNING: &str = "exec sleep 30";

/// Ignores SIGTERM; only SIGKILL ends it.
pub const IGNORES_SIGTERM: &str = "trap '' TERM\nwhile true; do sleep 1; done";

/// Exits with code 7 shortly after start.
pub const CRASHES_SOON: &str = "sleep 0.3\nexit 7";

/// Create a bundle whose interpreter runs `body`.
pub fn fake_backend(body: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let bin = dir.path().join("venv").join("bin");
    std::fs::create_dir_all(&bin).expect("create venv/bin");

    let python = bin.join("python");
    std::fs::write(&python, format!("#!/bin/sh\n{body}\n")).expect("write interpreter");
    std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755))
        .expect("chmod interpreter");

    std::fs::write(dir.path().join("main.py"), "# entry point\n").expect("write main.py");
    dir
}

/// Bundle with `main.py` but no interpreter.
pub fn incomplete_backend() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("main.py"), "").expect("write main.py");
    dir
}

/// Inspector that never finds anyone on the port.
pub struct EmptyPort;

impl PortInspector for EmptyPort {
    fn occupants(&self, _port: u16) -> Result<Vec<PortOccupant>, InspectError> {
        Ok(Vec::new())
    }
}

/// Config with short timings for tests.
pub fn test_config(backend: &Path, endpoint: ServiceEndpoint) -> SupervisorConfig {
    SupervisorConfig::for_backend(backend)
        .with_endpoint(endpoint)
        .with_warmup(Duration::from_millis(200))
        .with_health_interval(None)
        .with_probe_timeout(Duration::from_secs(1))
        .with_stop_timeouts(Duration::from_millis(500), Duration::from_secs(2))
        .with_reconcile_delay(Duration::from_millis(10))
}

/// Supervisor over `config` with an event broadcaster attached.
pub fn supervisor(config: SupervisorConfig) -> (Supervisor, SupervisorEventBroadcaster) {
    let events = SupervisorEventBroadcaster::new();
    let supervisor = Supervisor::builder(config)
        .emitter(Box::new(events.clone()))
        .port_inspector(Arc::new(EmptyPort))
        .build();
    (supervisor, events)
}
