//! In-process atomic counters.

use super::Metrics;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics sink backed by relaxed atomics.
#[derive(Debug, Default)]
pub struct SimpleMetrics {
    set_new: AtomicU64,
    set_update: AtomicU64,
    get_hit: AtomicU64,
    get_miss: AtomicU64,
    evicted: AtomicU64,
    ttl_expired: AtomicU64,
    lru_size: AtomicU64,
}

/// Point-in-time copy of [`SimpleMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub set_new: u64,
    pub set_update: u64,
    pub get_hit: u64,
    pub get_miss: u64,
    pub evicted: u64,
    pub ttl_expired: u64,
    pub lru_size: u64,
}

impl SimpleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every counter. The fields are loaded one by one, so the
    /// snapshot is not atomic across counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            set_new: self.set_new.load(Ordering::Relaxed),
            set_update: self.set_update.load(Ordering::Relaxed),
            get_hit: self.get_hit.load(Ordering::Relaxed),
            get_miss: self.get_miss.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            ttl_expired: self.ttl_expired.load(Ordering::Relaxed),
            lru_size: self.lru_size.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for SimpleMetrics {
    fn inc_set_new(&self) {
        self.set_new.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_set_update(&self) {
        self.set_update.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_get_hit(&self) {
        self.get_hit.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_get_miss(&self) {
        self.get_miss.fetch_add(1, Ordering::Relaxed);
    }

    fn add_evicted(&self, n: usize) {
        if n > 0 {
            self.evicted.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    fn add_ttl_expired(&self, n: usize) {
        if n > 0 {
            self.ttl_expired.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    fn set_lru_size(&self, n: usize) {
        self.lru_size.store(n as u64, Ordering::Relaxed);
    }
}
