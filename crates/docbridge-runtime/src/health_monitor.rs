//! Periodic health schedule.
//!
//! After a successful spawn the supervisor starts one schedule: wait the
//! warm-up delay, probe once, then probe on a fixed interval until
//! cancelled. The schedule is policy-free; it hands each result to a
//! callback that decides what to publish and whether to keep going.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::health::HealthMonitor;

/// Timing of a health schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSchedule {
    /// Delay before the first probe.
    pub warmup: Duration,
    /// Period of subsequent probes; `None` stops after the first.
    pub interval: Option<Duration>,
}

impl HealthSchedule {
    /// Start the schedule on a background task.
    ///
    /// `on_result` receives every probe result; returning
    /// `ControlFlow::Break` ends the schedule (e.g. the process it was
    /// started for is gone).
    pub fn spawn<F, Fut>(
        self,
        monitor: Arc<HealthMonitor>,
        cancel: CancellationToken,
        on_result: F,
    ) -> JoinHandle<()>
    where
        F: Fn(bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send,
    {
        tokio::spawn(async move {
            debug!(
                warmup_ms = self.warmup.as_millis(),
                interval_secs = self.interval.map(|i| i.as_secs()),
                "Starting health schedule"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = sleep(self.warmup) => {}
            }

            let healthy = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                healthy = monitor.check() => healthy,
            };
            if on_result(healthy).await.is_break() {
                return;
            }

            let Some(period) = self.interval else {
                debug!("Periodic health checks disabled");
                return;
            };

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let healthy = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    healthy = monitor.check() => healthy,
                };
                if on_result(healthy).await.is_break() {
                    break;
                }
            }

            debug!("Health schedule stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::ServiceEndpoint;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unreachable_monitor() -> Arc<HealthMonitor> {
        let port = TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        Arc::new(HealthMonitor::new(
            ServiceEndpoint::loopback(port),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn first_probe_waits_for_warmup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let schedule = HealthSchedule {
            warmup: Duration::from_millis(300),
            interval: None,
        };

        let handle = schedule.spawn(unreachable_monitor(), CancellationToken::new(), move |_| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handle.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn periodic_probes_until_break() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let schedule = HealthSchedule {
            warmup: Duration::ZERO,
            interval: Some(Duration::from_millis(20)),
        };

        let handle = schedule.spawn(unreachable_monitor(), CancellationToken::new(), move |healthy| {
            let seen = seen.clone();
            async move {
                assert!(!healthy);
                if seen.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_during_warmup_skips_probe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let cancel = CancellationToken::new();
        let schedule = HealthSchedule {
            warmup: Duration::from_secs(30),
            interval: Some(Duration::from_secs(1)),
        };

        let handle = schedule.spawn(unreachable_monitor(), cancel.clone(), move |_| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
