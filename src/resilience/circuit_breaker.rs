//! Circuit breaker: quarantine for failed backends.
//!
//! # States
//! - Active: registered in the load balancer, eligible for selection
//! - Quarantined: held here, never selected
//!
//! # State Transitions
//! ```text
//! Active → Quarantined: forwarding failed (caller subs + adds)
//! Quarantined → Active: health probe returned 200 OK
//! ```
//!
//! There is no terminal state; a quarantined backend is probed on every
//! tick until it recovers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::{PoolError, PoolResult};
use crate::health::{is_healthy, HealthProbe};
use crate::load_balancer::{LoadBalancer, ProxyHandle};
use crate::observability::metrics;
use crate::sync::Exclusive;

pub struct CircuitBreaker {
    quarantine: Exclusive<HashMap<String, ProxyHandle>>,
    balancer: Arc<LoadBalancer>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    /// Held for a whole recovery cycle so cycles never overlap.
    cycle: AsyncMutex<()>,
}

impl CircuitBreaker {
    pub fn new(balancer: Arc<LoadBalancer>, probe: Arc<dyn HealthProbe>, interval: Duration) -> Self {
        Self {
            quarantine: Exclusive::new(HashMap::new()),
            balancer,
            probe,
            interval,
            cycle: AsyncMutex::new(()),
        }
    }

    /// Quarantine a backend the caller has already removed from the pool.
    pub fn add(&self, id: String, handle: ProxyHandle) -> PoolResult<()> {
        self.quarantine.with(|q| {
            if q.contains_key(&id) {
                return Err(PoolError::AlreadyExists(id));
            }
            tracing::warn!(backend = %id, "Backend quarantined");
            q.insert(id, handle);
            Ok(())
        })?;
        metrics::record_quarantined();
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.quarantine.with(|q| q.contains_key(id))
    }

    pub fn len(&self) -> usize {
        self.quarantine.with(|q| q.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers currently quarantined, sorted.
    pub fn quarantined(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.quarantine.with(|q| q.keys().cloned().collect());
        ids.sort();
        ids
    }

    /// Run one recovery cycle and return the backends put back in the pool.
    pub async fn recover_once(&self) -> Vec<String> {
        let _cycle = self.cycle.lock().await;

        let candidates: Vec<(String, ProxyHandle)> = self
            .quarantine
            .with(|q| q.iter().map(|(id, h)| (id.clone(), h.clone())).collect());
        if candidates.is_empty() {
            return Vec::new();
        }

        let results = join_all(candidates.iter().map(|(id, handle)| async move {
            let status = self.probe.probe(id, handle).await;
            if !is_healthy(status) {
                tracing::debug!(backend = %id, status = ?status, "Backend still unhealthy");
            }
            (id.as_str(), is_healthy(status))
        }))
        .await;

        let healthy: Vec<(String, ProxyHandle)> = self.quarantine.with(|q| {
            results
                .iter()
                .filter(|(_, ok)| *ok)
                .filter_map(|(id, _)| q.remove_entry(*id))
                .collect()
        });

        // The breaker lock is released before touching the balancer.
        let mut recovered = Vec::with_capacity(healthy.len());
        for (id, handle) in healthy {
            match self.balancer.append(id.clone(), handle) {
                Ok(()) => {
                    tracing::info!(backend = %id, "Backend recovered, returned to pool");
                    metrics::record_recovered();
                    recovered.push(id);
                }
                Err(e) => {
                    tracing::warn!(backend = %id, error = %e, "Recovered backend could not be reinstated");
                }
            }
        }

        metrics::record_pool_sizes(self.balancer.len(), self.len());
        recovered
    }

    /// Probe quarantined backends on every tick until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Recovery loop starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.recover_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Recovery loop received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Start the recovery loop on the runtime.
    pub fn spawn(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use futures_util::future::{BoxFuture, FutureExt};
    use std::collections::HashSet;

    use crate::lifecycle::Shutdown;

    const A: &str = "http://127.0.0.1:8080";
    const B: &str = "http://127.0.0.1:8081";

    /// Reports 200 for identifiers in the healthy set, 503 otherwise.
    #[derive(Default)]
    struct ScriptedProbe {
        healthy: Exclusive<HashSet<String>>,
    }

    impl ScriptedProbe {
        fn heal(&self, id: &str) {
            self.healthy.with(|h| h.insert(id.to_string()));
        }
    }

    impl HealthProbe for ScriptedProbe {
        fn probe<'a>(&'a self, id: &'a str, _handle: &'a ProxyHandle) -> BoxFuture<'a, Option<StatusCode>> {
            let ok = self.healthy.with(|h| h.contains(id));
            async move {
                Some(if ok {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                })
            }
            .boxed()
        }
    }

    fn setup() -> (Arc<LoadBalancer>, Arc<ScriptedProbe>, Arc<CircuitBreaker>) {
        let lb = Arc::new(LoadBalancer::new());
        lb.add(A).unwrap();
        lb.add(B).unwrap();
        let probe = Arc::new(ScriptedProbe::default());
        let cb = Arc::new(CircuitBreaker::new(
            lb.clone(),
            probe.clone(),
            Duration::from_millis(10),
        ));
        (lb, probe, cb)
    }

    fn evict(lb: &LoadBalancer, cb: &CircuitBreaker, id: &str) {
        let handle = lb.sub(id).unwrap();
        cb.add(id.to_string(), handle).unwrap();
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let (lb, _, cb) = setup();
        let handle = lb.sub(A).unwrap();

        assert_eq!(cb.add(A.to_string(), handle.clone()), Ok(()));
        assert_eq!(
            cb.add(A.to_string(), handle),
            Err(PoolError::AlreadyExists(A.to_string()))
        );
        assert_eq!(cb.len(), 1);
    }

    #[tokio::test]
    async fn test_quarantine_round_trip() {
        let (lb, probe, cb) = setup();
        lb.get().unwrap();
        lb.get().unwrap();
        evict(&lb, &cb, A);

        assert!(!lb.contains(A));
        assert!(cb.contains(A));

        probe.heal(A);
        assert_eq!(cb.recover_once().await, vec![A.to_string()]);

        assert!(!cb.contains(A));
        assert_eq!(lb.outstanding(A), Some(0));
    }

    #[tokio::test]
    async fn test_unhealthy_backend_stays_quarantined() {
        let (lb, probe, cb) = setup();
        evict(&lb, &cb, A);
        evict(&lb, &cb, B);

        probe.heal(B);
        assert_eq!(cb.recover_once().await, vec![B.to_string()]);
        assert!(cb.recover_once().await.is_empty());

        assert_eq!(cb.quarantined(), vec![A.to_string()]);
        assert!(lb.contains(B));
    }

    #[tokio::test]
    async fn test_membership_is_exclusive() {
        let (lb, probe, cb) = setup();
        evict(&lb, &cb, A);
        probe.heal(A);

        for id in [A, B] {
            assert!(!(lb.contains(id) && cb.contains(id)));
        }
        cb.recover_once().await;
        for id in [A, B] {
            assert!(lb.contains(id) ^ cb.contains(id));
        }
    }

    #[tokio::test]
    async fn test_append_conflict_drops_quarantine_entry() {
        let (lb, probe, cb) = setup();
        let handle = lb.sub(A).unwrap();
        cb.add(A.to_string(), handle.clone()).unwrap();
        // Out-of-band re-registration breaks the partition.
        lb.append(A.to_string(), handle).unwrap();

        probe.heal(A);
        assert!(cb.recover_once().await.is_empty());
        assert!(!cb.contains(A));
        assert!(lb.contains(A));
    }

    #[tokio::test]
    async fn test_loop_recovers_and_stops_on_shutdown() {
        let (lb, probe, cb) = setup();
        evict(&lb, &cb, A);
        probe.heal(A);

        let shutdown = Shutdown::new();
        let task = cb.spawn(shutdown.subscribe());

        time::timeout(Duration::from_secs(2), async {
            while !lb.contains(A) {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend was not recovered");

        shutdown.trigger();
        time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
