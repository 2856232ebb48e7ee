//! Lifecycle tests against real child processes.

#![cfg(unix)]

mod common;

use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use common::fixtures::{
    CRASHES_SOON, IGNORES_SIGTERM, LONG_RUNNING, fake_backend, incomplete_backend, supervisor,
    test_config,
};
use common::stubs::{closed_endpoint, serve};
use docbridge_core::{
    HealthStatus, LaunchRole, SupervisorError, SupervisorEvent, SupervisorPhase,
};
use docbridge_runtime::process::{is_port_available, pid_exists};
use docbridge_runtime::{
    ShutdownOutcome, StartOutcome, Supervisor, SupervisorEventBroadcaster,
};
use tokio_test::{assert_err, assert_ok};

/// Port handed to [`hold_port_helper`] through the environment.
const HOLD_PORT_VAR: &str = "DOCBRIDGE_TEST_HOLD_PORT";

/// Not a test on its own: when re-executed with [`HOLD_PORT_VAR`] set, this
/// process binds the port and sits on it, standing in for a stale server.
#[test]
fn hold_port_helper() {
    let Some(port) = std::env::var(HOLD_PORT_VAR)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    else {
        return;
    };
    let _listener = std::net::TcpListener::bind(("127.0.0.1", port)).expect("bind held port");
    std::thread::sleep(Duration::from_secs(30));
}

/// Start another process that listens on `port` and wait until it does.
fn foreign_listener(port: u16) -> Child {
    let exe = std::env::current_exe().expect("test binary path");
    let child = Command::new(exe)
        .args(["--exact", "hold_port_helper", "--nocapture", "--test-threads=1"])
        .env(HOLD_PORT_VAR, port.to_string())
        .spawn()
        .expect("spawn port holder");

    let deadline = Instant::now() + Duration::from_secs(10);
    while is_port_available("127.0.0.1", port) {
        assert!(Instant::now() < deadline, "port holder never bound {port}");
        std::thread::sleep(Duration::from_millis(20));
    }
    child
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn start_twice_keeps_the_same_process() {
    let backend = fake_backend(LONG_RUNNING);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));

    let first = assert_ok!(supervisor.start().await);
    let StartOutcome::Started { pid } = first else {
        panic!("expected a fresh start, got {first:?}");
    };
    assert!(supervisor.is_running());
    assert_eq!(supervisor.pid(), Some(pid));

    let second = assert_ok!(supervisor.start().await);
    assert_eq!(second, StartOutcome::AlreadyRunning { pid });
    assert_eq!(supervisor.pid(), Some(pid));

    supervisor.stop().await;
}

#[tokio::test]
async fn stop_then_start_spawns_a_new_process() {
    let backend = fake_backend(LONG_RUNNING);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));

    let first = supervisor.start().await.unwrap().pid();
    let outcome = supervisor.stop().await.expect("a process was running");
    assert!(matches!(outcome, ShutdownOutcome::Graceful(_)));
    assert!(!supervisor.is_running());
    assert!(!supervisor.is_healthy());
    assert_eq!(supervisor.pid(), None);

    let second = supervisor.start().await.unwrap();
    assert!(matches!(second, StartOutcome::Started { .. }));
    assert_ne!(second.pid(), first);

    supervisor.stop().await;
}

#[tokio::test]
async fn stop_without_process_is_a_no_op() {
    let backend = fake_backend(LONG_RUNNING);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));

    assert!(supervisor.stop().await.is_none());
    assert_eq!(supervisor.snapshot().phase, SupervisorPhase::Idle);
}

#[tokio::test]
async fn missing_interpreter_spawns_nothing() {
    let backend = incomplete_backend();
    let (supervisor, events) = supervisor(test_config(backend.path(), closed_endpoint()));
    let mut rx = events.subscribe();

    let err = assert_err!(supervisor.start().await);
    assert!(matches!(
        err,
        SupervisorError::LaunchTargetMissing {
            role: LaunchRole::Executable,
            ..
        }
    ));

    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot.phase, SupervisorPhase::Idle);
    assert!(!snapshot.running);
    assert_eq!(snapshot.pid, None);
    assert!(snapshot.last_error.is_some());

    let mut saw_launch_failed = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, SupervisorEvent::LaunchFailed { .. }) {
            saw_launch_failed = true;
        }
    }
    assert!(saw_launch_failed);
}

#[tokio::test]
async fn stop_escalates_when_sigterm_is_ignored() {
    let backend = fake_backend(IGNORES_SIGTERM);
    let config = test_config(backend.path(), closed_endpoint());
    let budget = config.grace + config.settle;
    let (supervisor, _events) = supervisor(config);

    let pid = supervisor.start().await.unwrap().pid();
    // Let the shell install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let outcome = supervisor.stop().await.expect("a process was running");
    assert!(started.elapsed() <= budget + Duration::from_millis(500));

    match outcome {
        ShutdownOutcome::Forced(Some(info)) => {
            assert_eq!(info.pid, pid);
            assert_eq!(info.signal, Some(9));
        }
        other => panic!("expected SIGKILL escalation, got {other:?}"),
    }
    assert!(!supervisor.is_running());
    assert!(!pid_exists(pid));
}

#[tokio::test]
async fn concurrent_stops_shut_down_once() {
    let backend = fake_backend(LONG_RUNNING);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));
    supervisor.start().await.unwrap();
    let other = supervisor.clone();

    let (a, b) = tokio::join!(supervisor.stop(), other.stop());
    assert_eq!(
        usize::from(a.is_some()) + usize::from(b.is_some()),
        1,
        "exactly one stop should own the shutdown"
    );

    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot.phase, SupervisorPhase::Terminated);
    assert!(!snapshot.running);
    assert!(!snapshot.healthy);
}

#[tokio::test]
async fn crash_is_published_without_restart() {
    let backend = fake_backend(CRASHES_SOON);
    let (supervisor, events) = supervisor(test_config(backend.path(), closed_endpoint()));
    let mut rx = events.subscribe();
    let mut state = supervisor.subscribe();

    let pid = supervisor.start().await.unwrap().pid();

    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.phase == SupervisorPhase::Terminated),
    )
    .await
    .expect("crash should be observed")
    .expect("supervisor alive")
    .clone();

    assert!(!snapshot.running);
    assert!(!snapshot.healthy);
    let exit = snapshot.last_exit.expect("exit recorded");
    assert_eq!(exit.pid, pid);
    assert_eq!(exit.code, Some(7));
    assert!(snapshot.last_error.unwrap().contains("exited unexpectedly"));

    let mut crashed = None;
    while let Ok(event) = rx.try_recv() {
        if let SupervisorEvent::Crashed(info) = event {
            crashed = Some(info);
        }
    }
    assert_eq!(crashed.map(|info| info.code), Some(Some(7)));

    // No automatic restart; the handle is already gone
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!supervisor.is_running());
    assert!(supervisor.stop().await.is_none());
}

#[tokio::test]
async fn stop_racing_a_crash_stays_consistent() {
    let backend = fake_backend(CRASHES_SOON);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));

    supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(290)).await;
    supervisor.stop().await;
    // Whichever side won, the watcher must have nothing left to do
    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot.phase, SupervisorPhase::Terminated);
    assert!(!snapshot.running);
    assert!(!snapshot.healthy);
    assert_eq!(snapshot.pid, None);

    // A fresh start is not confused by the old generation
    let restarted = supervisor.start().await.unwrap();
    assert!(matches!(restarted, StartOutcome::Started { .. }));
    supervisor.stop().await;
}

#[tokio::test]
async fn shutdown_stops_the_process() {
    let backend = fake_backend(LONG_RUNNING);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));
    let observer = supervisor.subscribe();

    let pid = supervisor.start().await.unwrap().pid();
    supervisor.shutdown().await;

    assert!(!observer.borrow().running);
    assert!(!pid_exists(pid));
}

#[tokio::test]
async fn foreign_listener_is_reclaimed_before_launch() {
    let endpoint = closed_endpoint();
    let port = endpoint.port();
    let mut holder = foreign_listener(port);
    let holder_pid = holder.id();

    let backend = fake_backend(LONG_RUNNING);
    let events = SupervisorEventBroadcaster::new();
    let mut rx = events.subscribe();
    // Real socket tables and real signals
    let supervisor = Supervisor::builder(test_config(backend.path(), endpoint))
        .emitter(Box::new(events.clone()))
        .build();

    let outcome = assert_ok!(supervisor.start().await);
    assert!(matches!(outcome, StartOutcome::Started { .. }));
    assert_ne!(outcome.pid(), holder_pid);

    let status = holder.wait().expect("reap port holder");
    assert!(matches!(status.signal(), Some(15 | 9)), "holder ended with {status:?}");
    assert!(is_port_available("127.0.0.1", port));

    let reclaimed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            SupervisorEvent::PortReclaimed { port, pid, .. } => Some((port, pid)),
            _ => None,
        })
        .collect();
    assert_eq!(reclaimed, vec![(port, holder_pid)]);

    supervisor.stop().await;
}

#[tokio::test]
async fn probe_time_is_tracked_per_process() {
    let endpoint = serve(axum::Router::new().route(
        "/health",
        axum::routing::get(|| async { axum::Json(serde_json::json!({ "status": "ok" })) }),
    ))
    .await;
    let backend = fake_backend(LONG_RUNNING);
    let (supervisor, _events) = supervisor(test_config(backend.path(), endpoint));

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.health_status(), HealthStatus::unknown());
    assert!(supervisor.wait_until_healthy(Duration::from_secs(5)).await);
    let first = supervisor.health_status();
    assert!(first.healthy);
    let first_at = first.checked_at.expect("probe time recorded");

    // A repeated healthy result still moves the timestamp
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(supervisor.check_health().await);
    let second_at = supervisor.health_status().checked_at.expect("probe time");
    assert!(second_at > first_at);
    assert_eq!(supervisor.snapshot().health_checked_at, Some(second_at));

    supervisor.stop().await;
    assert_eq!(supervisor.health_status(), HealthStatus::unknown());

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.health_status().checked_at, None);
    assert!(supervisor.wait_until_healthy(Duration::from_secs(5)).await);
    assert!(supervisor.health_status().checked_at.is_some_and(|at| at > second_at));

    supervisor.stop().await;
}

#[tokio::test]
async fn terminating_still_reports_the_process() {
    let backend = fake_backend(IGNORES_SIGTERM);
    let (supervisor, _events) = supervisor(test_config(backend.path(), closed_endpoint()));
    let mut state = supervisor.subscribe();

    let pid = supervisor.start().await.unwrap().pid();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopping = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.stop().await }
    });

    let during = tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| s.phase == SupervisorPhase::Terminating),
    )
    .await
    .expect("stop should enter Terminating")
    .expect("supervisor alive")
    .clone();
    assert!(during.running);
    assert!(!during.healthy);
    assert_eq!(during.pid, Some(pid));

    stopping.await.unwrap();
    let after = supervisor.snapshot();
    assert_eq!(after.phase, SupervisorPhase::Terminated);
    assert!(!after.running);
    assert_eq!(after.pid, None);
}

#[tokio::test]
async fn stop_after_unnoticed_exit_reports_a_crash() {
    let backend = fake_backend("exit 3");
    let (supervisor, events) = supervisor(test_config(backend.path(), closed_endpoint()));
    let mut rx = events.subscribe();

    let pid = supervisor.start().await.unwrap().pid();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Whether the watcher or stop() gets there first, the exit is a crash
    let outcome = supervisor.stop().await;
    assert!(
        matches!(outcome, None | Some(ShutdownOutcome::AlreadyExited(_))),
        "unexpected {outcome:?}"
    );

    let snapshot = supervisor.snapshot();
    assert_eq!(snapshot.phase, SupervisorPhase::Terminated);
    assert_eq!(snapshot.last_exit.map(|e| (e.pid, e.code)), Some((pid, Some(3))));
    assert!(
        snapshot
            .last_error
            .is_some_and(|e| e.contains("exited unexpectedly"))
    );

    let crashes: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            SupervisorEvent::Crashed(info) => Some(info.code),
            _ => None,
        })
        .collect();
    assert_eq!(crashes, vec![Some(3)]);
}
