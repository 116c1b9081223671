//! Prometheus Metrics
//!
//! Counters and the LRU gauge live in a registry owned by the sink rather
//! than the process-wide default registry, so several stores (and tests) can
//! each have their own without duplicate-registration errors.
//!
//! | Metric                         | Type    |
//! |--------------------------------|---------|
//! | `<ns>_set_new_total`           | counter |
//! | `<ns>_set_update_total`        | counter |
//! | `<ns>_get_hit_total`           | counter |
//! | `<ns>_get_miss_total`          | counter |
//! | `<ns>_evicted_total`           | counter |
//! | `<ns>_ttl_expired_total`       | counter |
//! | `<ns>_lru_current_size`        | gauge   |

use super::Metrics;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::fmt;

/// Metrics sink exporting to Prometheus.
#[derive(Clone)]
pub struct PromMetrics {
    registry: Registry,
    set_new: IntCounter,
    set_update: IntCounter,
    get_hit: IntCounter,
    get_miss: IntCounter,
    evicted: IntCounter,
    ttl_expired: IntCounter,
    lru_size: IntGauge,
}

impl PromMetrics {
    /// Creates the metrics under `namespace` and registers them.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let set_new = counter("set_new_total", "Number of new keys set")?;
        let set_update = counter("set_update_total", "Number of keys updated")?;
        let get_hit = counter("get_hit_total", "Number of cache hits")?;
        let get_miss = counter("get_miss_total", "Number of cache misses")?;
        let evicted = counter("evicted_total", "Number of evicted items")?;
        let ttl_expired = counter("ttl_expired_total", "Number of TTL expired items")?;

        let lru_size = IntGauge::with_opts(
            Opts::new(
                "lru_current_size",
                "Current number of keys tracked by LRU",
            )
            .namespace(namespace),
        )?;
        registry.register(Box::new(lru_size.clone()))?;

        Ok(Self {
            registry,
            set_new,
            set_update,
            get_hit,
            get_miss,
            evicted,
            ttl_expired,
            lru_size,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("UTF-8 conversion error: {}", e)))
    }
}

impl fmt::Debug for PromMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromMetrics")
            .field("set_new", &self.set_new.get())
            .field("set_update", &self.set_update.get())
            .field("get_hit", &self.get_hit.get())
            .field("get_miss", &self.get_miss.get())
            .field("evicted", &self.evicted.get())
            .field("ttl_expired", &self.ttl_expired.get())
            .field("lru_size", &self.lru_size.get())
            .finish()
    }
}

impl Metrics for PromMetrics {
    fn inc_set_new(&self) {
        self.set_new.inc();
    }

    fn inc_set_update(&self) {
        self.set_update.inc();
    }

    fn inc_get_hit(&self) {
        self.get_hit.inc();
    }

    fn inc_get_miss(&self) {
        self.get_miss.inc();
    }

    fn add_evicted(&self, n: usize) {
        if n > 0 {
            self.evicted.inc_by(n as u64);
        }
    }

    fn add_ttl_expired(&self, n: usize) {
        if n > 0 {
            self.ttl_expired.inc_by(n as u64);
        }
    }

    fn set_lru_size(&self, n: usize) {
        self.lru_size.set(i64::try_from(n).unwrap_or(i64::MAX));
    }
}
