//! Lifecycle controller for the conversion server.
//!
//! `Supervisor` sequences port reconciliation, launch, health scheduling and
//! shutdown, and publishes one [`SupervisorSnapshot`] that consumers read or
//! subscribe to.
//!
//! # Concurrency
//!
//! - The process slot sits behind an async mutex. `start`, `stop` and the
//!   termination watcher all take it, so handle mutation is serialized.
//! - Published state is a `watch` channel; each change is one
//!   `send_modify`, so `running`/`healthy` are never seen out of step.
//! - Every spawn gets a generation number. The termination watcher and the
//!   health schedule only touch state while their generation is live.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use docbridge_core::{
    ExitInfo, HealthStatus, NoopEmitter, NoopOutputSink, OutputSinkPort, SupervisorError,
    SupervisorEvent, SupervisorEventEmitter, SupervisorPhase, SupervisorResult,
    SupervisorSnapshot,
};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::health::HealthMonitor;
use crate::health_monitor::HealthSchedule;
use crate::process::{
    ManagedProcess, PortInspector, PortReconciler, ProcessLauncher, ProcessSignaller,
    ReconcileReport, ShutdownOutcome, SystemPortInspector, SystemSignaller, shutdown_process,
};

/// No process is live.
const NO_GENERATION: u64 = 0;

/// Result of a successful [`Supervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was spawned.
    Started { pid: u32 },
    /// A live process already existed; nothing was spawned.
    AlreadyRunning { pid: u32 },
}

impl StartOutcome {
    pub const fn pid(self) -> u32 {
        match self {
            Self::Started { pid } | Self::AlreadyRunning { pid } => pid,
        }
    }
}

/// The live process and the schedule probing it.
struct Slot {
    process: ManagedProcess,
    health_cancel: CancellationToken,
}

struct Inner {
    config: SupervisorConfig,
    launcher: ProcessLauncher,
    reconciler: PortReconciler,
    health: Arc<HealthMonitor>,
    emitter: Box<dyn SupervisorEventEmitter>,
    state: watch::Sender<SupervisorSnapshot>,
    slot: Mutex<Option<Slot>>,
    next_generation: AtomicU64,
    live_generation: AtomicU64,
}

/// Builder for [`Supervisor`]. Every collaborator has a production default.
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    output_sink: Arc<dyn OutputSinkPort>,
    emitter: Box<dyn SupervisorEventEmitter>,
    inspector: Arc<dyn PortInspector>,
    signaller: Arc<dyn ProcessSignaller>,
}

impl SupervisorBuilder {
    pub fn new(config: SupervisorConfig) -> Self {
        let inspector = SystemPortInspector::new(config.endpoint.host());
        Self {
            config,
            output_sink: Arc::new(NoopOutputSink),
            emitter: Box::new(NoopEmitter::new()),
            inspector: Arc::new(inspector),
            signaller: Arc::new(SystemSignaller),
        }
    }

    /// Where drained stdout/stderr lines go.
    #[must_use]
    pub fn output_sink(mut self, sink: Arc<dyn OutputSinkPort>) -> Self {
        self.output_sink = sink;
        self
    }

    #[must_use]
    pub fn emitter(mut self, emitter: Box<dyn SupervisorEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    #[must_use]
    pub fn port_inspector(mut self, inspector: Arc<dyn PortInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    #[must_use]
    pub fn signaller(mut self, signaller: Arc<dyn ProcessSignaller>) -> Self {
        self.signaller = signaller;
        self
    }

    pub fn build(self) -> Supervisor {
        let reconciler = PortReconciler::new(self.inspector, self.signaller)
            .with_delay(self.config.reconcile_delay);
        let health = Arc::new(HealthMonitor::new(
            self.config.endpoint.clone(),
            self.config.probe_timeout,
        ));
        let (state, _) = watch::channel(SupervisorSnapshot::idle());

        Supervisor {
            inner: Arc::new(Inner {
                config: self.config,
                launcher: ProcessLauncher::new(self.output_sink),
                reconciler,
                health,
                emitter: self.emitter,
                state,
                slot: Mutex::new(None),
                next_generation: AtomicU64::new(NO_GENERATION),
                live_generation: AtomicU64::new(NO_GENERATION),
            }),
        }
    }
}

/// Handle to the server supervisor. Cheap to clone.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Supervisor with default collaborators.
    pub fn new(config: SupervisorConfig) -> Self {
        SupervisorBuilder::new(config).build()
    }

    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Start the server unless it is already running.
    ///
    /// # Errors
    ///
    /// `LaunchTargetMissing` or `LaunchFailure`; in both cases nothing is
    /// running afterwards and the phase is back to `Idle`.
    pub async fn start(&self) -> SupervisorResult<StartOutcome> {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        if let Some(current) = slot.as_ref() {
            if current.process.is_alive() {
                let pid = current.process.pid();
                info!(pid = %pid, "Server already running, not starting another");
                return Ok(StartOutcome::AlreadyRunning { pid });
            }
        }
        if let Some(stale) = slot.take() {
            debug!(pid = %stale.process.pid(), "Clearing exited process handle");
            stale.health_cancel.cancel();
            inner.live_generation.store(NO_GENERATION, Ordering::SeqCst);
            // The watcher saw the exit but has not reported it yet
            if let Some(info) = stale.process.exit_info() {
                inner.publish_crash(info);
            }
        }

        let port = inner.config.endpoint.port();
        inner.update(|s| s.transition(SupervisorPhase::PortClearing));
        let report = inner.reconciler.reconcile(port).await;
        inner.emit_reclaimed(&report);

        inner.update(|s| s.transition(SupervisorPhase::Launching));
        let launched = match inner
            .launcher
            .launch(&inner.config.target, &inner.config.endpoint)
        {
            Ok(launched) => launched,
            Err(err) => {
                warn!(error = %err, "Server launch failed");
                inner.update(|s| {
                    s.transition(SupervisorPhase::Idle);
                    s.last_error = Some(err.to_string());
                });
                inner.emitter.emit(SupervisorEvent::launch_failed(err.to_string()));
                return Err(err);
            }
        };

        let pid = launched.pid;
        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);
        let process = ManagedProcess::watch(launched.child, pid, generation, move |info| {
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_exit(generation, info).await;
                }
            }
        });

        inner.live_generation.store(generation, Ordering::SeqCst);
        inner.update(|s| s.launched(pid));
        info!(pid = %pid, generation = %generation, url = %inner.config.endpoint.base_url(), "Server started");

        let health_cancel = CancellationToken::new();
        self.spawn_health_schedule(generation, health_cancel.clone());

        *slot = Some(Slot {
            process,
            health_cancel,
        });
        Ok(StartOutcome::Started { pid })
    }

    fn spawn_health_schedule(&self, generation: u64, cancel: CancellationToken) {
        let schedule = HealthSchedule {
            warmup: self.inner.config.warmup,
            interval: self.inner.config.health_interval,
        };
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        schedule.spawn(Arc::clone(&self.inner.health), cancel, move |healthy| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) if inner.is_live(generation) => {
                        inner.publish_health(generation, healthy);
                        ControlFlow::Continue(())
                    }
                    _ => ControlFlow::Break(()),
                }
            }
        });
    }

    /// Stop the server: SIGTERM, wait, SIGKILL.
    ///
    /// Returns `None` if nothing was running. Safe to call concurrently and
    /// while the process is exiting on its own.
    pub async fn stop(&self) -> Option<ShutdownOutcome> {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        let Some(current) = slot.take() else {
            debug!("Stop requested but no server process is running");
            return None;
        };
        current.health_cancel.cancel();
        inner
            .live_generation
            .store(NO_GENERATION, Ordering::SeqCst);

        inner.health.reset();

        let pid = current.process.pid();
        inner.update(|s| s.transition(SupervisorPhase::Terminating));
        info!(pid = %pid, "Stopping server");

        let outcome =
            shutdown_process(&current.process, inner.config.grace, inner.config.settle).await;
        match outcome {
            // Died on its own before the watcher could report it
            ShutdownOutcome::AlreadyExited(Some(info)) => inner.publish_crash(info),
            _ => {
                inner.update(|s| s.terminated(outcome.exit_info()));
                info!(pid = %pid, ?outcome, "Server stopped");
            }
        }

        Some(outcome)
    }

    /// Probe health now and publish the result.
    ///
    /// Returns the published value, which is never `true` unless the
    /// process is running.
    pub async fn check_health(&self) -> bool {
        let generation = self.inner.live_generation.load(Ordering::SeqCst);
        if generation == NO_GENERATION {
            debug!("Skipping health check, server not running");
            return false;
        }

        let healthy = self.inner.health.check().await;
        self.inner.publish_health(generation, healthy)
    }

    /// Current published state.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().running
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.state.borrow().healthy
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.state.borrow().pid
    }

    /// Published health plus the time of the last probe of the current
    /// process. Unknown while nothing is running.
    pub fn health_status(&self) -> HealthStatus {
        self.inner.state.borrow().health()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorSnapshot> {
        self.inner.state.subscribe()
    }

    /// Wait until the server is published healthy.
    ///
    /// Returns `false` on timeout or if the process terminates first.
    pub async fn wait_until_healthy(&self, limit: Duration) -> bool {
        let mut rx = self.subscribe();
        let wait = rx.wait_for(|s| s.healthy || s.phase == SupervisorPhase::Terminated);
        let healthy = match tokio::time::timeout(limit, wait).await {
            Ok(Ok(snapshot)) => snapshot.healthy,
            Ok(Err(_)) | Err(_) => false,
        };
        healthy
    }

    /// Stop the server and release this handle, for application exit.
    pub async fn shutdown(self) {
        if let Some(outcome) = self.stop().await {
            debug!(?outcome, "Supervisor shut down");
        }
    }
}

impl Inner {
    fn is_live(&self, generation: u64) -> bool {
        self.live_generation.load(Ordering::SeqCst) == generation
    }

    /// Apply `f` to the published snapshot and emit the result.
    fn update(&self, f: impl FnOnce(&mut SupervisorSnapshot)) {
        let mut published = None;
        self.state.send_modify(|snapshot| {
            f(snapshot);
            published = Some(snapshot.clone());
        });
        if let Some(snapshot) = published {
            self.emitter.emit(SupervisorEvent::StateChanged(snapshot));
        }
    }

    /// Publish a probe result for `generation`. Returns the published flag.
    ///
    /// Every live result refreshes the probe time; `StateChanged` is only
    /// emitted when the phase or the healthy flag moves.
    fn publish_health(&self, generation: u64, healthy: bool) -> bool {
        let checked_at = Utc::now();
        let mut published = false;
        let mut changed = None;
        self.state.send_if_modified(|snapshot| {
            // Checked under the channel lock so a stop or restart wins
            if !self.is_live(generation) {
                return false;
            }
            let before = (snapshot.phase, snapshot.healthy, snapshot.health_checked_at);
            published = snapshot.apply_health(healthy, checked_at);
            if before.0 != snapshot.phase || before.1 != snapshot.healthy {
                changed = Some(snapshot.clone());
            }
            before.2 != snapshot.health_checked_at
        });
        if let Some(snapshot) = changed {
            self.emitter.emit(SupervisorEvent::StateChanged(snapshot));
        }
        published
    }

    fn emit_reclaimed(&self, report: &ReconcileReport) {
        let reclaimed = report
            .terminated
            .iter()
            .map(|pid| (*pid, false))
            .chain(report.killed.iter().map(|pid| (*pid, true)));
        for (pid, forced) in reclaimed {
            self.emitter.emit(SupervisorEvent::PortReclaimed {
                port: report.port,
                pid,
                forced,
            });
        }
    }

    /// Termination watcher callback.
    ///
    /// Only acts if the slot still holds this generation; a `stop()` that
    /// already took the handle has published the outcome itself.
    async fn handle_exit(&self, generation: u64, info: ExitInfo) {
        let mut slot = self.slot.lock().await;
        let ours = slot
            .as_ref()
            .is_some_and(|current| current.process.generation() == generation);
        if !ours {
            return;
        }

        if let Some(current) = slot.take() {
            current.health_cancel.cancel();
        }
        self.live_generation.store(NO_GENERATION, Ordering::SeqCst);
        self.publish_crash(info);
    }

    /// Publish an unrequested exit: `Terminated` with the crash recorded
    /// in `last_error`, then a `Crashed` event.
    fn publish_crash(&self, info: ExitInfo) {
        self.health.reset();

        let err = SupervisorError::ProcessCrashed {
            pid: info.pid,
            code: info.code,
            signal: info.signal,
        };
        warn!(pid = %info.pid, error = %err, "Server process exited unexpectedly");

        self.update(|s| {
            s.terminated(Some(info));
            s.last_error = Some(err.to_string());
        });
        self.emitter.emit(SupervisorEvent::Crashed(info));
    }
}
