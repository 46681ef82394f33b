//! Periodic export of cache statistics as Prometheus gauges.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{IntGauge, Opts};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::store::{CacheStats, InMemCache};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::{MetricsError, MetricsRegistry};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct CacheGauges {
    hits: IntGauge,
    misses: IntGauge,
    del_hits: IntGauge,
    del_misses: IntGauge,
    collisions: IntGauge,
    bytes_stored: IntGauge,
    items_stored: IntGauge,
}

impl CacheGauges {
    fn new(namespace: &str) -> Result<Self, MetricsError> {
        let gauge = |name: &str, help: &str| {
            IntGauge::with_opts(Opts::new(format!("cache_{name}_total"), help).namespace(namespace))
        };
        Ok(Self {
            hits: gauge("hits", "Number of cache hits.")?,
            misses: gauge("misses", "Number of cache misses.")?,
            del_hits: gauge("del_hits", "Number of cache delete hits.")?,
            del_misses: gauge("del_misses", "Number of cache delete misses.")?,
            collisions: gauge("collisions", "Number of cache key collisions.")?,
            bytes_stored: gauge("bytes_stored", "Number of bytes stored.")?,
            items_stored: gauge("items_stored", "Number of items stored.")?,
        })
    }

    fn all(&self) -> [&IntGauge; 7] {
        [
            &self.hits,
            &self.misses,
            &self.del_hits,
            &self.del_misses,
            &self.collisions,
            &self.bytes_stored,
            &self.items_stored,
        ]
    }

    fn set(&self, stats: &CacheStats) {
        self.hits.set(clamp(stats.hits));
        self.misses.set(clamp(stats.misses));
        self.del_hits.set(clamp(stats.del_hits));
        self.del_misses.set(clamp(stats.del_misses));
        self.collisions.set(clamp(stats.collisions));
        self.bytes_stored.set(clamp(stats.bytes_stored));
        self.items_stored.set(clamp(stats.items_stored));
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Publishes [`CacheStats`] snapshots on a fixed interval until shutdown.
pub struct CacheStatsCollector {
    cache: Arc<InMemCache>,
    gauges: CacheGauges,
    registry: MetricsRegistry,
    interval: Duration,
}

impl CacheStatsCollector {
    /// Register the cache gauges. Nothing runs until [`spawn`](Self::spawn)
    /// or [`run`](Self::run).
    pub fn new(
        registry: &MetricsRegistry,
        cache: Arc<InMemCache>,
        interval: Duration,
    ) -> Result<Self, MetricsError> {
        let gauges = CacheGauges::new(registry.namespace())?;

        let mut registered: Vec<&IntGauge> = Vec::new();
        for gauge in gauges.all() {
            if let Err(e) = registry.register(Box::new(gauge.clone())) {
                for done in registered {
                    registry.unregister(Box::new(done.clone()))?;
                }
                return Err(e);
            }
            registered.push(gauge);
        }

        Ok(Self {
            cache,
            gauges,
            registry: registry.clone(),
            interval,
        })
    }

    /// Take one snapshot: reclaim expired entries and update every gauge.
    pub fn collect(&self) {
        self.cache.purge_expired();
        self.gauges.set(&self.cache.stats());
    }

    /// Collect every interval until `stop` fires, then unregister the gauges.
    pub async fn run(self, mut stop: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "Cache stats collector started");

        loop {
            tokio::select! {
                biased;
                () = stop.recv() => break,
                _ = ticker.tick() => self.collect(),
            }
        }

        for gauge in self.gauges.all() {
            if let Err(e) = self.registry.unregister(Box::new(gauge.clone())) {
                tracing::warn!(error = %e, "Failed to unregister cache gauge");
            }
        }
        tracing::info!("Cache stats collector stopped");
    }

    pub fn spawn(self, shutdown: &Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown.subscribe()))
    }
}
