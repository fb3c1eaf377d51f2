//! Background recovery of unavailable endpoints.
//!
//! Each tick probes every endpoint on the registry's recovery list. A
//! successful probe restores the endpoint; enough consecutive failures evict it.

mod probe;

use crate::config::HealthConfig;
use crate::registry::Registry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use probe::{HttpProber, ProbeError, Prober};

const LOG_TARGET: &str = "balancer::health";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthEvent {
    Recovered { address: String },
    ProbeFailed { address: String, failures: u32 },
    Evicted { address: String, failures: u32 },
}

pub struct HealthMonitor<P> {
    registry: Arc<Registry>,
    prober: P,
    config: HealthConfig,
}

impl<P> HealthMonitor<P>
where
    P: Prober + 'static,
{
    pub fn new(registry: Arc<Registry>, prober: P, config: HealthConfig) -> Self {
        Self {
            registry,
            prober,
            config,
        }
    }

    /// Runs one pass over a snapshot of the recovery list.
    pub async fn check_once(&self) -> Vec<HealthEvent> {
        let pending = self.registry.unavailable();
        let mut events = Vec::with_capacity(pending.len());

        for endpoint in pending {
            if endpoint.is_available() || endpoint.is_evicted() {
                continue;
            }

            match self.prober.probe(endpoint.address()).await {
                Ok(()) => {
                    self.registry.mark_available(&endpoint);
                    tracing::info!(target: LOG_TARGET, endpoint = %endpoint.address(), "endpoint is available again");
                    events.push(HealthEvent::Recovered {
                        address: endpoint.address().to_owned(),
                    });
                }
                Err(e) => {
                    let failures = self.registry.record_probe_failure(&endpoint);
                    if failures >= self.config.failure_threshold {
                        self.registry.evict(&endpoint);
                        tracing::warn!(
                            target: LOG_TARGET,
                            endpoint = %endpoint.address(),
                            failures,
                            error = %e,
                            "endpoint removed after repeated health check failures"
                        );
                        events.push(HealthEvent::Evicted {
                            address: endpoint.address().to_owned(),
                            failures,
                        });
                    } else {
                        tracing::debug!(
                            target: LOG_TARGET,
                            endpoint = %endpoint.address(),
                            failures,
                            error = %e,
                            "health check failed"
                        );
                        events.push(HealthEvent::ProbeFailed {
                            address: endpoint.address().to_owned(),
                            failures,
                        });
                    }
                }
            }
        }
        events
    }

    /// Ticks every `interval` until `cancel` fires. The first check runs one
    /// interval after start.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = self.config.interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let interval_ms = interval.as_millis() as u64;
            tracing::debug!(target: LOG_TARGET, interval_ms, "health monitor started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = self.check_once() => {}
                        }
                    }
                }
            }
            tracing::debug!(target: LOG_TARGET, "health monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Succeeds for addresses in `healthy`, counting every probe.
    struct StubProber {
        healthy: parking_lot::Mutex<HashSet<String>>,
        calls: AtomicUsize,
    }

    impl StubProber {
        fn new(healthy: &[&str]) -> Self {
            Self {
                healthy: parking_lot::Mutex::new(healthy.iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Prober for StubProber {
        fn probe<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, Result<(), ProbeError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.healthy.lock().contains(endpoint) {
                    Ok(())
                } else {
                    Err(ProbeError::Status(503))
                }
            }
            .boxed()
        }
    }

    fn setup(healthy: &[&str]) -> (Arc<Registry>, Arc<StubProber>, HealthMonitor<Arc<StubProber>>) {
        let registry = Arc::new(Registry::new(["http://a", "http://b", "http://c"]).unwrap());
        let prober = Arc::new(StubProber::new(healthy));
        let config = HealthConfig::new(Duration::from_millis(20), Duration::from_millis(20), 3)
            .unwrap();
        let monitor = HealthMonitor::new(Arc::clone(&registry), Arc::clone(&prober), config);
        (registry, prober, monitor)
    }

    #[tokio::test]
    async fn successful_probe_recovers_endpoint() {
        let (registry, _prober, monitor) = setup(&["http://a"]);
        let a = registry.get("http://a").unwrap();
        registry.mark_unavailable(&a);
        registry.record_probe_failure(&a);

        let events = monitor.check_once().await;
        assert_eq!(
            events,
            vec![HealthEvent::Recovered {
                address: "http://a".to_owned()
            }]
        );
        assert!(a.is_available());
        assert_eq!(a.health_failures(), 0);
        assert!(registry.unavailable().is_empty());
    }

    #[tokio::test]
    async fn endpoint_below_threshold_stays_pending() {
        let (registry, _prober, monitor) = setup(&[]);
        let b = registry.get("http://b").unwrap();
        registry.mark_unavailable(&b);

        monitor.check_once().await;
        let events = monitor.check_once().await;
        assert_eq!(
            events,
            vec![HealthEvent::ProbeFailed {
                address: "http://b".to_owned(),
                failures: 2
            }]
        );
        assert!(!b.is_evicted());
        assert_eq!(registry.unavailable().len(), 1);
    }

    #[tokio::test]
    async fn endpoint_reaching_threshold_is_evicted() {
        let (registry, prober, monitor) = setup(&[]);
        let b = registry.get("http://b").unwrap();
        registry.mark_unavailable(&b);

        for _ in 0..3 {
            monitor.check_once().await;
        }
        assert!(b.is_evicted());
        assert!(!b.is_available());
        assert!(registry.unavailable().is_empty());

        // No further probes once evicted.
        let before = prober.calls.load(Ordering::SeqCst);
        assert!(monitor.check_once().await.is_empty());
        assert_eq!(prober.calls.load(Ordering::SeqCst), before);
        for _ in 0..6 {
            assert_ne!(registry.select_available().unwrap().address(), "http://b");
        }
    }

    #[tokio::test]
    async fn mixed_pass_compacts_recovery_list() {
        let (registry, _prober, monitor) = setup(&["http://a", "http://c"]);
        for ep in registry.endpoints().to_vec() {
            registry.mark_unavailable(&ep);
        }

        let events = monitor.check_once().await;
        assert_eq!(events.len(), 3);
        let pending: Vec<String> = registry
            .unavailable()
            .iter()
            .map(|e| e.address().to_owned())
            .collect();
        assert_eq!(pending, vec!["http://b".to_owned()]);
        assert_eq!(registry.available_count(), 2);
    }

    #[tokio::test]
    async fn spawned_monitor_recovers_and_stops_on_cancel() {
        let (registry, prober, monitor) = setup(&["http://c"]);
        let c = registry.get("http://c").unwrap();
        registry.mark_unavailable(&c);

        let cancel = CancellationToken::new();
        let handle = monitor.spawn(cancel.clone());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !c.is_available() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("endpoint recovered by background monitor");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor stops after cancel")
            .unwrap();
        assert!(prober.calls.load(Ordering::SeqCst) >= 1);
    }
}
