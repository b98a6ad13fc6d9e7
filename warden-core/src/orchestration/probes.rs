//! Probe registry backed by the broker's worker inspection, cached for a TTL.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::ports::BrokerInspector;

#[derive(Clone, Debug)]
struct ProbeCache {
    probes: Vec<String>,
    refreshed_at: DateTime<Utc>,
}

/// Probe names currently served by at least one worker, cached for a TTL.
///
/// The cache starts empty, is only refreshed by reads past the TTL and is
/// never invalidated from outside. Concurrent refreshes within one window
/// are allowed; the last writer wins.
pub struct ProbeRegistry {
    inspector: Arc<dyn BrokerInspector>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    results_queue: String,
    cache: Mutex<Option<ProbeCache>>,
}

impl fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ProbeRegistry");
        debug
            .field("ttl", &self.ttl)
            .field("results_queue", &self.results_queue);
        match self.cache.try_lock() {
            Ok(cache) => {
                debug.field("cache", &*cache);
            }
            Err(_) => {
                debug.field("cache", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl ProbeRegistry {
    pub fn new(
        inspector: Arc<dyn BrokerInspector>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        results_queue: impl Into<String>,
    ) -> Self {
        Self {
            inspector,
            clock,
            ttl,
            results_queue: results_queue.into(),
            cache: Mutex::new(None),
        }
    }

    /// Available probe names in discovery order.
    ///
    /// Within the TTL the cached list is returned even if the broker has
    /// changed since. A failed discovery leaves the cache untouched.
    pub async fn available_probes(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        {
            let cache = self.cache.lock().await;
            if let Some(cache) = cache.as_ref()
                && now - cache.refreshed_at < self.ttl
            {
                debug!(probes = cache.probes.len(), "probe cache hit");
                return Ok(cache.probes.clone());
            }
        }

        let workers = self.inspector.active_queues().await?;
        let mut probes: Vec<String> = Vec::new();
        for queue in workers.into_iter().flat_map(|w| w.queues) {
            if queue != self.results_queue && !probes.contains(&queue) {
                probes.push(queue);
            }
        }

        debug!(probes = probes.len(), "probe cache refreshed");
        *self.cache.lock().await = Some(ProbeCache {
            probes: probes.clone(),
            refreshed_at: now,
        });
        Ok(probes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::WardenError;
    use crate::infra::memory::InProcBroker;
    use crate::ports::WorkerQueues;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        Inspector {}

        #[async_trait]
        impl BrokerInspector for Inspector {
            async fn active_queues(&self) -> Result<Vec<WorkerQueues>>;
        }
    }

    fn registry(broker: &Arc<InProcBroker>, clock: &ManualClock) -> ProbeRegistry {
        ProbeRegistry::new(
            broker.clone(),
            Arc::new(clock.clone()),
            Duration::seconds(60),
            "brain",
        )
    }

    #[tokio::test]
    async fn dedupes_queues_and_hides_results_queue() {
        let broker = Arc::new(InProcBroker::default());
        broker.register_worker("w1", ["clamav", "brain", "comodo"]).await;
        broker.register_worker("w2", ["comodo", "kaspersky"]).await;

        let probes = registry(&broker, &ManualClock::default())
            .available_probes()
            .await
            .unwrap();
        assert_eq!(probes, vec!["clamav", "comodo", "kaspersky"]);
    }

    #[tokio::test]
    async fn serves_stale_list_within_ttl() {
        let broker = Arc::new(InProcBroker::default());
        let clock = ManualClock::default();
        broker.register_worker("w1", ["clamav"]).await;
        let registry = registry(&broker, &clock);

        assert_eq!(registry.available_probes().await.unwrap(), vec!["clamav"]);

        broker.register_worker("w2", ["comodo"]).await;
        clock.advance(Duration::seconds(59));
        assert_eq!(registry.available_probes().await.unwrap(), vec!["clamav"]);

        clock.advance(Duration::seconds(1));
        assert_eq!(
            registry.available_probes().await.unwrap(),
            vec!["clamav", "comodo"]
        );
    }

    #[tokio::test]
    async fn empty_discovery_is_not_an_error() {
        let broker = Arc::new(InProcBroker::default());
        let probes = registry(&broker, &ManualClock::default())
            .available_probes()
            .await
            .unwrap();
        assert!(probes.is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_cache() {
        let clock = ManualClock::default();
        let mut inspector = MockInspector::new();
        let mut calls = 0;
        inspector.expect_active_queues().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![WorkerQueues {
                    worker: "w1".into(),
                    queues: vec!["clamav".into()],
                }])
            } else {
                Err(WardenError::Broker("connection reset".into()))
            }
        });
        let registry = ProbeRegistry::new(
            Arc::new(inspector),
            Arc::new(clock.clone()),
            Duration::seconds(60),
            "brain",
        );

        registry.available_probes().await.unwrap();
        clock.advance(Duration::seconds(61));
        assert!(registry.available_probes().await.is_err());

        let cache = registry.cache.lock().await;
        assert_eq!(cache.as_ref().unwrap().probes, vec!["clamav"]);
    }
}
