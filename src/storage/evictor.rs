//! Eviction Policies
//!
//! An [`Evictor`] watches every write, read and removal the store performs
//! and, when a capacity bound is crossed, names the keys to throw out. The
//! store calls it after the shard lock is released, so an evictor's own lock
//! never nests inside a shard lock.
//!
//! ## LRU
//!
//! [`LruEvictor`] keeps a single recency list across all shards. Fairness is
//! measured over the whole key space: a cold key in a busy shard is evicted
//! before a warm key in a quiet one.
//!
//! ```text
//!   front (LRU)                                   back (MRU)
//!   ┌─────┐    ┌─────┐    ┌─────┐    ┌─────┐    ┌─────┐
//!   │  b  │ ─> │  e  │ ─> │  a  │ ─> │  d  │ ─> │  c  │
//!   └─────┘    └─────┘    └─────┘    └─────┘    └─────┘
//!   next victim                        set/get hits move here
//! ```

use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;

/// A pluggable eviction policy.
///
/// Implementations must be cheap and must not call back into the store.
pub trait Evictor<K, V>: Send + Sync {
    /// Called after `key` was written to its shard.
    ///
    /// Returns the keys to evict. They are already dropped from the policy's
    /// own bookkeeping; the store removes them from their shards without
    /// calling [`Evictor::on_delete`] for them.
    fn on_set(&self, key: &K, value: &V, existed: bool) -> Vec<K>;

    /// Called after a read. `hit` is false for misses.
    fn on_get(&self, key: &K, hit: bool);

    /// Called when a key was removed by an explicit delete or by expiry.
    fn on_delete(&self, key: &K);

    /// Number of keys the policy is tracking, if it keeps count.
    fn size(&self) -> Option<usize> {
        None
    }
}

/// Least-recently-used eviction across the whole store.
pub struct LruEvictor<K> {
    state: Mutex<LruState<K>>,
}

struct LruState<K> {
    capacity: usize,
    /// Used unbounded; the capacity above is enforced by `on_set`
    order: LruCache<K, ()>,
}

impl<K: Hash + Eq> LruState<K> {
    fn evict_overflow(&mut self) -> Vec<K> {
        let mut victims = Vec::new();
        while self.order.len() > self.capacity {
            match self.order.pop_lru() {
                Some((key, ())) => victims.push(key),
                None => break,
            }
        }
        victims
    }
}

impl<K: Hash + Eq> LruEvictor<K> {
    /// Creates an LRU evictor holding at most `capacity` keys (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                capacity: capacity.max(1),
                order: LruCache::unbounded(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Changes the capacity (minimum 1).
    ///
    /// Shrinking does not evict on its own: the excess keys are reported as
    /// victims by the next `on_set` of a new key.
    pub fn set_capacity(&self, capacity: usize) {
        self.state.lock().capacity = capacity.max(1);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is tracked. Does not touch its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().order.contains(key)
    }

    /// Tracked keys from least to most recently used.
    pub fn keys_lru_first(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.state
            .lock()
            .order
            .iter()
            .rev()
            .map(|(key, ())| key.clone())
            .collect()
    }
}

impl<K, V> Evictor<K, V> for LruEvictor<K>
where
    K: Hash + Eq + Clone + Send + Sync,
{
    fn on_set(&self, key: &K, _value: &V, existed: bool) -> Vec<K> {
        let mut state = self.state.lock();

        if existed && state.order.contains(key) {
            state.order.promote(key);
            return Vec::new();
        }

        state.order.put(key.clone(), ());
        state.evict_overflow()
    }

    fn on_get(&self, key: &K, hit: bool) {
        if !hit {
            return;
        }
        self.state.lock().order.promote(key);
    }

    fn on_delete(&self, key: &K) {
        self.state.lock().order.pop(key);
    }

    fn size(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<K: Hash + Eq> fmt::Debug for LruEvictor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LruEvictor")
            .field("capacity", &state.capacity)
            .field("len", &state.order.len())
            .finish()
    }
}
