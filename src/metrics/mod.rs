//! Metrics Sinks
//!
//! The store reports what it does through the [`Metrics`] trait and never
//! reads anything back, so a sink cannot change the store's behaviour.
//!
//! - [`NoopMetrics`]: discards everything (the default)
//! - [`SimpleMetrics`]: relaxed atomic counters, readable via a snapshot
//! - [`PromMetrics`]: Prometheus counters and a gauge in a private registry
//!
//! Counters are updated with relaxed ordering and the LRU-size gauge is a
//! plain store, so two concurrent writers may briefly leave it stale.

pub mod prom;
pub mod simple;

pub use prom::PromMetrics;
pub use simple::{MetricsSnapshot, SimpleMetrics};

/// Receiver for store events.
///
/// Every method is side-effect only and must not panic.
pub trait Metrics: Send + Sync {
    /// A set created a new key.
    fn inc_set_new(&self);
    /// A set overwrote an existing key.
    fn inc_set_update(&self);
    fn inc_get_hit(&self);
    fn inc_get_miss(&self);
    /// Keys removed by the eviction policy.
    fn add_evicted(&self, n: usize);
    /// Keys removed because their TTL ran out (lazily or by the sweeper).
    fn add_ttl_expired(&self, n: usize);
    /// Keys currently tracked by the eviction policy.
    fn set_lru_size(&self, n: usize);
}

/// Metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn inc_set_new(&self) {}
    fn inc_set_update(&self) {}
    fn inc_get_hit(&self) {}
    fn inc_get_miss(&self) {}
    fn add_evicted(&self, _n: usize) {}
    fn add_ttl_expired(&self, _n: usize) {}
    fn set_lru_size(&self, _n: usize) {}
}
