//! Thread-Safe Storage Engine with Expiry and Eviction
//!
//! This module implements the core storage engine for kavos: a sharded
//! `HashMap` with per-key TTL, an optional global eviction policy and a
//! background expiry sweeper.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over a power-of-two number of shards,
//!    each with its own `RwLock`. The shard index is `hash & (shards - 1)`.
//! 2. **Lazy + Active Expiry**: Expired keys are removed when read and by the
//!    background sweeper.
//! 3. **Notify Outside the Lock**: The evictor, metrics and logger are only
//!    called after the shard lock is released. A shard lock and the evictor
//!    lock are never held together, so they cannot deadlock.
//! 4. **Global Eviction**: One evictor sees every key in every shard.
//!
//! ## Concurrency Model
//!
//! ```text
//!   set/get/delete                              sweeper thread
//!        │                                            │
//!        ▼                                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │  lock #1   │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! │        │  (shard lock released)                             │
//! │        ▼                                                    │
//! │  ┌─────────────────┐   ┌───────────┐   ┌────────┐           │
//! │  │ Evictor (Mutex) │   │  Metrics  │   │ Logger │  lock #2  │
//! │  └─────────────────┘   └───────────┘   └────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations on the same key are serialized by its shard lock. Recency
//! updates are serialized by the evictor's own lock.

use crate::storage::config::StoreConfig;
use crate::storage::evictor::Evictor;
use crate::storage::expiry::ExpirySweeper;
use crate::storage::hash::{next_power_of_two, ShardKey};
use crate::storage::shard::{Entry, Lookup, Shard, Shards};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Bounds a type needs to be used as a store key.
pub trait StoreKey: ShardKey + Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> StoreKey for T where T: ShardKey + Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static {}

/// Bounds a type needs to be used as a store value.
pub trait StoreValue: Clone + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Send + Sync + 'static {}

type SharedEvictor<K, V> = Arc<dyn Evictor<K, V>>;

/// The main storage engine.
///
/// Wrap it in an `Arc` to share it across threads or request handlers. All
/// operations are thread-safe and never fail.
///
/// # Example
///
/// ```
/// use kavos::storage::{LruEvictor, Store, StoreConfig};
/// use std::time::Duration;
///
/// let store: Store<String, String> = Store::new(StoreConfig::default().with_shards(16))
///     .with_evictor(LruEvictor::new(10_000));
///
/// store.set("name".to_string(), "kavos".to_string());
/// assert_eq!(store.get(&"name".to_string()), Some("kavos".to_string()));
///
/// store.set_with_ttl("session".to_string(), "abc123".to_string(), Duration::from_secs(60));
/// assert_eq!(store.len(), 2);
///
/// store.delete(&"name".to_string());
/// assert_eq!(store.get(&"name".to_string()), None);
///
/// store.close();
/// ```
pub struct Store<K, V> {
    inner: Arc<Inner<K, V>>,
    /// Running sweeper, taken by the first `close`
    sweeper: Mutex<Option<ExpirySweeper>>,
}

struct Inner<K, V> {
    shards: Shards<K, V>,
    mask: usize,
    evictor: RwLock<Option<SharedEvictor<K, V>>>,
    config: StoreConfig,
}

impl<K: StoreKey, V: StoreValue> Default for Store<K, V> {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl<K: StoreKey, V: StoreValue> Store<K, V> {
    /// Creates a store and, if the config asks for one, starts the sweeper.
    pub fn new(config: StoreConfig) -> Self {
        let shard_count = next_power_of_two(config.shards);
        let inner = Arc::new(Inner {
            shards: Shards::new(shard_count, config.shard_padding),
            mask: shard_count - 1,
            evictor: RwLock::new(None),
            config,
        });

        let sweeper = Self::start_sweeper(&inner);

        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    fn start_sweeper(inner: &Arc<Inner<K, V>>) -> Option<ExpirySweeper> {
        let interval = inner.config.cleanup_interval;
        if interval.is_zero() {
            return None;
        }

        let sweep_target = Arc::clone(inner);
        match ExpirySweeper::start(interval, move || {
            sweep_target.cleanup_expired();
        }) {
            Ok(sweeper) => Some(sweeper),
            Err(e) => {
                // Lazy expiry still works without the sweeper
                inner
                    .config
                    .log(|| error!(error = %e, "store.cleanup.spawn_failed"));
                None
            }
        }
    }

    /// Attaches an eviction policy, replacing any previous one.
    ///
    /// The policy only learns about keys written after it is attached.
    pub fn with_evictor<E>(self, evictor: E) -> Self
    where
        E: Evictor<K, V> + 'static,
    {
        self.set_evictor(Arc::new(evictor));
        self
    }

    /// Attaches a shared eviction policy, replacing any previous one.
    ///
    /// Keeping a clone of the `Arc` lets the caller reach the concrete
    /// policy later, e.g. to change an [`LruEvictor`](super::LruEvictor)'s
    /// capacity.
    pub fn set_evictor(&self, evictor: SharedEvictor<K, V>) {
        *self.inner.evictor.write() = Some(evictor);
    }

    /// Detaches the eviction policy, if any.
    pub fn clear_evictor(&self) {
        *self.inner.evictor.write() = None;
    }

    /// Keys tracked by the eviction policy, if one is attached and counts.
    pub fn evictor_size(&self) -> Option<usize> {
        self.inner.evictor().and_then(|e| e.size())
    }

    /// Sets a key-value pair without expiry.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, Duration::ZERO);
    }

    /// Sets a key-value pair that expires after `ttl` (zero = never).
    ///
    /// Overwrites any existing entry (last write wins).
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.inner.set_with_ttl(key, value, ttl);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired keys
    /// found here are removed ("lazy expiry").
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    /// Deletes a key, returning whether it existed.
    pub fn delete(&self, key: &K) -> bool {
        self.inner.remove(key, false)
    }

    /// Approximate number of live keys.
    ///
    /// Counts entries that have no expiry or have not expired yet, without
    /// removing anything. Keys may expire right after being counted, and
    /// shards are counted one after another, so the result is a snapshot
    /// of nothing in particular under concurrent writes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs one expiry sweep over all shards and returns the removed count.
    ///
    /// This is what the background sweeper calls on every tick.
    pub fn cleanup_expired(&self) -> usize {
        self.inner.cleanup_expired()
    }

    /// Number of shards (always a power of two).
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// The shard a key lives on.
    pub fn shard_index(&self, key: &K) -> usize {
        self.inner.shard_index(key)
    }

    /// Whether the background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_running())
    }

    /// Stops the background sweeper and waits for it to exit.
    ///
    /// Safe to call when no sweeper was started and safe to call repeatedly;
    /// only the first call does any work. A concurrent second caller blocks
    /// until the first has finished joining the sweeper.
    pub fn close(&self) {
        let mut sweeper = self.sweeper.lock();
        if let Some(mut running) = sweeper.take() {
            running.stop();
            self.inner.config.log(|| info!("store.closed"));
        }
    }
}

impl<K, V> Drop for Store<K, V> {
    fn drop(&mut self) {
        if let Some(mut running) = self.sweeper.get_mut().take() {
            running.stop();
        }
    }
}

impl<K: StoreKey, V: StoreValue> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.inner.shards.len())
            .field("padded", &self.inner.shards.is_padded())
            .field("evictor", &self.inner.evictor.read().is_some())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<K: StoreKey, V: StoreValue> Inner<K, V> {
    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        (key.shard_hash() as usize) & self.mask
    }

    #[inline]
    fn shard(&self, key: &K) -> &Shard<K, V> {
        self.shards.get(self.shard_index(key))
    }

    #[inline]
    fn evictor(&self) -> Option<SharedEvictor<K, V>> {
        self.evictor.read().clone()
    }

    fn refresh_lru_size(&self, evictor: &dyn Evictor<K, V>) {
        if let Some(size) = evictor.size() {
            self.config.metrics.set_lru_size(size);
        }
    }

    fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let evictor = self.evictor();
        let policy_value = evictor.as_ref().map(|_| value.clone());

        let existed = self.shard(&key).set(key.clone(), Entry::with_ttl(value, ttl));

        let metrics = &self.config.metrics;
        if existed {
            metrics.inc_set_update();
            self.config.log(|| debug!(key = ?key, "store.update"));
        } else {
            metrics.inc_set_new();
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            self.config
                .log(|| debug!(key = ?key, ttl_ms, "store.set"));
        }

        let (Some(evictor), Some(value)) = (evictor, policy_value) else {
            return;
        };

        let victims = evictor.on_set(&key, &value, existed);
        for victim in &victims {
            self.remove(victim, true);
        }
        if !victims.is_empty() {
            metrics.add_evicted(victims.len());
            self.config
                .log(|| info!(count = victims.len(), victims = ?victims, "store.evict"));
        }
        self.refresh_lru_size(&*evictor);
    }

    fn get(&self, key: &K) -> Option<V> {
        let shard = self.shard(key);
        let metrics = &self.config.metrics;

        match shard.lookup(key, Instant::now()) {
            Lookup::Live(value) => {
                metrics.inc_get_hit();
                if let Some(evictor) = self.evictor() {
                    evictor.on_get(key, true);
                }
                Some(value)
            }
            Lookup::Missing => {
                metrics.inc_get_miss();
                if let Some(evictor) = self.evictor() {
                    evictor.on_get(key, false);
                }
                None
            }
            Lookup::Expired(stamp) => {
                metrics.inc_get_miss();
                self.expire_stale(key, stamp);
                None
            }
        }
    }

    /// Removes `key` if it still carries the stale `stamp` seen by a read.
    ///
    /// A concurrent set between the read and this call wins: its entry is
    /// kept and nobody is told about an expiry.
    fn expire_stale(&self, key: &K, stamp: Instant) -> bool {
        if !self.shard(key).remove_if_stamp(key, Some(stamp)) {
            return false;
        }

        if let Some(evictor) = self.evictor() {
            evictor.on_delete(key);
            self.refresh_lru_size(&*evictor);
        }
        self.config.metrics.add_ttl_expired(1);
        self.config.log(|| debug!(key = ?key, "store.ttl.expired"));
        true
    }

    /// Removes a key. Evictions skip the evictor, it already forgot the key.
    fn remove(&self, key: &K, from_eviction: bool) -> bool {
        let existed = self.shard(key).delete(key);

        if existed && !from_eviction {
            if let Some(evictor) = self.evictor() {
                evictor.on_delete(key);
                self.refresh_lru_size(&*evictor);
            }
        }

        existed
    }

    fn len(&self) -> usize {
        let now = Instant::now();
        self.shards.iter().map(|shard| shard.live_count(now)).sum()
    }

    fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let evictor = self.evictor();
        let mut total = 0;

        for (index, shard) in self.shards.iter().enumerate() {
            let expired = shard.drain_expired(now);
            if expired.is_empty() {
                continue;
            }
            total += expired.len();

            if let Some(evictor) = &evictor {
                for key in &expired {
                    evictor.on_delete(key);
                }
                self.refresh_lru_size(&**evictor);
            }

            self.config
                .log(|| info!(shard = index, removed = expired.len(), "store.ttl.cleanup"));
        }

        if total > 0 {
            self.config.metrics.add_ttl_expired(total);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SimpleMetrics;
    use crate::storage::LruEvictor;
    use std::collections::HashSet;
    use std::io;
    use std::thread;

    fn s(v: &str) -> String {
        v.to_string()
    }

    fn string_store() -> Store<String, String> {
        Store::new(StoreConfig::default().with_shards(16))
    }

    /// Evictor that records every call and evicts nothing.
    #[derive(Default)]
    struct RecordingEvictor {
        calls: parking_lot::Mutex<Vec<String>>,
    }

    impl RecordingEvictor {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl Evictor<String, String> for RecordingEvictor {
        fn on_set(&self, key: &String, _value: &String, existed: bool) -> Vec<String> {
            self.calls.lock().push(format!("set:{}:{}", key, existed));
            Vec::new()
        }

        fn on_get(&self, key: &String, hit: bool) {
            self.calls.lock().push(format!("get:{}:{}", key, hit));
        }

        fn on_delete(&self, key: &String) {
            self.calls.lock().push(format!("delete:{}", key));
        }
    }

    /// In-memory log sink for asserting on store events.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn dispatch(&self) -> tracing::Dispatch {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::Dispatch::new(subscriber)
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn test_set_get_delete() {
        let store = string_store();

        store.set(s("a"), s("1"));
        assert_eq!(store.get(&s("a")), Some(s("1")));

        assert!(store.delete(&s("a")));
        assert_eq!(store.get(&s("a")), None);
        assert!(!store.delete(&s("a"))); // Already deleted
    }

    #[test]
    fn test_overwrite_last_write_wins() {
        let store = string_store();

        store.set(s("k"), s("v1"));
        store.set(s("k"), s("v2"));
        assert_eq!(store.get(&s("k")), Some(s("v2")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_clears_ttl() {
        let store = string_store();

        store.set_with_ttl(s("k"), s("v1"), Duration::from_millis(30));
        store.set(s("k"), s("v2"));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get(&s("k")), Some(s("v2")));
    }

    #[test]
    fn test_delete_missing_key() {
        let store = string_store();
        assert!(!store.delete(&s("nothing")));
        assert_eq!(store.get(&s("nothing")), None);
    }

    #[test]
    fn test_ttl_lazy_expiry() {
        let store = string_store();

        store.set_with_ttl(s("k"), s("v"), Duration::from_millis(30));
        assert_eq!(store.get(&s("k")), Some(s("v")));

        thread::sleep(Duration::from_millis(70));
        assert_eq!(store.get(&s("k")), None);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let store = string_store();

        store.set_with_ttl(s("k"), s("v"), Duration::ZERO);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.get(&s("k")), Some(s("v")));
    }

    #[test]
    fn test_huge_ttl_does_not_panic() {
        let store = string_store();

        store.set_with_ttl(s("k"), s("v"), Duration::MAX);
        store.set_with_ttl(s("n"), s("v"), Duration::from_secs(i64::MAX as u64));

        assert_eq!(store.get(&s("k")), Some(s("v")));
        assert_eq!(store.get(&s("n")), Some(s("v")));
        assert_eq!(store.cleanup_expired(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_refresh_between_stale_read_and_removal_survives() {
        let metrics = Arc::new(SimpleMetrics::new());
        let recorder = Arc::new(RecordingEvictor::default());
        let store: Store<String, String> =
            Store::new(StoreConfig::default().with_metrics(metrics.clone()));
        store.set_evictor(recorder.clone());

        store.set_with_ttl(s("k"), s("old"), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));

        // A reader sees the stale entry...
        let key = s("k");
        let stamp = match store.inner.shard(&key).lookup(&key, Instant::now()) {
            Lookup::Expired(stamp) => stamp,
            other => panic!("expected a stale entry, got {:?}", other),
        };
        // ...then a writer refreshes it before the reader takes the write lock
        store.set(s("k"), s("new"));
        assert!(!store.inner.expire_stale(&key, stamp));

        assert_eq!(store.get(&key), Some(s("new")));
        assert!(!recorder.calls().iter().any(|c| c.starts_with("delete:")));
        assert_eq!(metrics.snapshot().ttl_expired, 0);

        // The stamp that is still current does expire the entry
        store.set_with_ttl(s("k"), s("newer"), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.get(&key), None);
        assert_eq!(recorder.calls().last().map(String::as_str), Some("delete:k"));
        assert_eq!(metrics.snapshot().ttl_expired, 1);
    }

    #[test]
    fn test_lazy_expiry_without_sweep_tick() {
        let store: Store<String, String> = Store::new(
            StoreConfig::default().with_cleanup_interval(Duration::from_millis(100)),
        );
        assert!(store.is_sweeping());

        store.set_with_ttl(s("k"), s("v"), Duration::from_millis(30));
        assert_eq!(store.get(&s("k")), Some(s("v")));

        // The sweeper has not ticked yet
        thread::sleep(Duration::from_millis(70));
        assert_eq!(store.get(&s("k")), None);

        store.close();
    }

    #[test]
    fn test_background_sweep_removes_unread_keys() {
        let metrics = Arc::new(SimpleMetrics::new());
        let store: Store<String, String> = Store::new(
            StoreConfig::default()
                .with_cleanup_interval(Duration::from_millis(10))
                .with_metrics(metrics.clone()),
        );

        for i in 0..10 {
            store.set_with_ttl(format!("key{}", i), s("value"), Duration::from_millis(30));
        }
        store.set(s("persistent"), s("value"));

        thread::sleep(Duration::from_millis(150));

        // Swept without any reads
        assert_eq!(store.inner.shards.iter().map(|s| s.raw_len()).sum::<usize>(), 1);
        assert_eq!(metrics.snapshot().ttl_expired, 10);
        assert_eq!(store.get(&s("persistent")), Some(s("value")));

        store.close();
    }

    #[test]
    fn test_cleanup_expired() {
        let store = string_store();

        store.set_with_ttl(s("key1"), s("value1"), Duration::from_millis(10));
        store.set_with_ttl(s("key2"), s("value2"), Duration::from_millis(10));
        store.set(s("key3"), s("value3")); // No expiry

        thread::sleep(Duration::from_millis(50));

        assert_eq!(store.cleanup_expired(), 2);
        assert_eq!(store.cleanup_expired(), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&s("key3")), Some(s("value3")));
    }

    #[test]
    fn test_len_skips_expired_without_removing() {
        let store = string_store();

        store.set(s("a"), s("1"));
        store.set_with_ttl(s("b"), s("2"), Duration::from_millis(10));
        assert_eq!(store.len(), 2);

        thread::sleep(Duration::from_millis(40));

        assert_eq!(store.len(), 1);
        // Still physically present until read or swept
        assert_eq!(store.inner.shards.iter().map(|s| s.raw_len()).sum::<usize>(), 2);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_lru_eviction_scenario() {
        let store = string_store().with_evictor(LruEvictor::new(2));

        store.set(s("a"), s("1"));
        store.set(s("b"), s("2"));
        assert_eq!(store.get(&s("a")), Some(s("1"))); // 'a' is now most recent

        store.set(s("c"), s("3"));

        assert_eq!(store.get(&s("b")), None);
        assert_eq!(store.get(&s("a")), Some(s("1")));
        assert_eq!(store.get(&s("c")), Some(s("3")));

        // 'a' was read before 'c', so it goes next
        store.set(s("d"), s("4"));
        assert_eq!(store.get(&s("a")), None);
    }

    #[test]
    fn test_lru_capacity_bound() {
        let metrics = Arc::new(SimpleMetrics::new());
        let lru = Arc::new(LruEvictor::<u64>::new(10));
        let store: Store<u64, u64> =
            Store::new(StoreConfig::default().with_metrics(metrics.clone()));
        store.set_evictor(lru.clone());

        for i in 0..100u64 {
            store.set(i, i);
        }

        assert_eq!(store.len(), 10);
        assert_eq!(lru.len(), 10);
        assert_eq!(store.evictor_size(), Some(10));
        // The ten most recent survive
        for i in 90..100u64 {
            assert_eq!(store.get(&i), Some(i));
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.evicted, 90);
        assert_eq!(snap.lru_size, 10);
    }

    #[test]
    fn test_lru_tracks_explicit_delete_and_expiry() {
        let lru = Arc::new(LruEvictor::<String>::new(10));
        let store = string_store();
        store.set_evictor(lru.clone());

        store.set(s("a"), s("1"));
        store.set_with_ttl(s("b"), s("2"), Duration::from_millis(10));
        store.set_with_ttl(s("c"), s("3"), Duration::from_millis(10));
        assert_eq!(lru.len(), 3);

        store.delete(&s("a"));
        assert_eq!(lru.len(), 2);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.get(&s("b")), None); // lazy expiry
        assert_eq!(lru.len(), 1);
        store.cleanup_expired(); // sweep takes 'c'
        assert!(lru.is_empty());
    }

    #[test]
    fn test_shrinking_lru_capacity_at_runtime() {
        let lru = Arc::new(LruEvictor::<String>::new(5));
        let store = string_store();
        store.set_evictor(lru.clone());

        for key in ["a", "b", "c", "d", "e"] {
            store.set(s(key), s("v"));
        }
        lru.set_capacity(2);
        store.set(s("f"), s("v"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&s("e")), Some(s("v")));
        assert_eq!(store.get(&s("f")), Some(s("v")));
    }

    #[test]
    fn test_evictor_notifications() {
        let recorder = Arc::new(RecordingEvictor::default());
        let store = string_store();
        store.set_evictor(recorder.clone());

        store.set(s("a"), s("1"));
        store.set(s("a"), s("2"));
        store.get(&s("a"));
        store.get(&s("missing"));
        store.delete(&s("a"));
        store.delete(&s("a")); // not present, no notification

        assert_eq!(
            recorder.calls(),
            vec![
                "set:a:false",
                "set:a:true",
                "get:a:true",
                "get:missing:false",
                "delete:a",
            ]
        );
        // No size reported, the gauge stays untouched
        assert_eq!(store.evictor_size(), None);
    }

    #[test]
    fn test_evicted_keys_skip_on_delete() {
        /// Evicts every key except the one just written.
        struct KeepLatest {
            last: parking_lot::Mutex<Option<String>>,
            deletes: parking_lot::Mutex<Vec<String>>,
        }

        impl Evictor<String, String> for KeepLatest {
            fn on_set(&self, key: &String, _: &String, _: bool) -> Vec<String> {
                self.last.lock().replace(key.clone()).into_iter().collect()
            }
            fn on_get(&self, _: &String, _: bool) {}
            fn on_delete(&self, key: &String) {
                self.deletes.lock().push(key.clone());
            }
        }

        let policy = Arc::new(KeepLatest {
            last: parking_lot::Mutex::new(None),
            deletes: parking_lot::Mutex::new(Vec::new()),
        });
        let store = string_store();
        store.set_evictor(policy.clone());

        store.set(s("a"), s("1"));
        store.set(s("b"), s("2"));

        assert_eq!(store.get(&s("a")), None);
        assert_eq!(store.get(&s("b")), Some(s("2")));
        assert!(policy.deletes.lock().is_empty());
    }

    #[test]
    fn test_metrics_basic() {
        let metrics = Arc::new(SimpleMetrics::new());
        let store: Store<String, String> =
            Store::new(StoreConfig::default().with_metrics(metrics.clone()));

        store.set(s("a"), s("1"));
        store.set(s("a"), s("2"));
        store.set_with_ttl(s("b"), s("3"), Duration::from_millis(30));
        store.get(&s("a"));
        store.get(&s("missing"));
        thread::sleep(Duration::from_millis(40));
        store.get(&s("b"));

        let snap = metrics.snapshot();
        assert_eq!(snap.set_new, 2);
        assert_eq!(snap.set_update, 1);
        assert_eq!(snap.get_hit, 1);
        assert_eq!(snap.get_miss, 2);
        assert_eq!(snap.ttl_expired, 1);
        assert_eq!(snap.evicted, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let store: Store<String, String> = Store::new(
            StoreConfig::default().with_cleanup_interval(Duration::from_millis(10)),
        );
        assert!(store.is_sweeping());

        store.close();
        assert!(!store.is_sweeping());
        store.close();

        // Still usable, only the sweeper is gone
        store.set(s("a"), s("1"));
        assert_eq!(store.get(&s("a")), Some(s("1")));
    }

    #[test]
    fn test_close_without_sweeper() {
        let store = string_store();
        assert!(!store.is_sweeping());
        store.close();
        store.close();
    }

    #[test]
    fn test_concurrent_close() {
        let store: Arc<Store<String, String>> = Arc::new(Store::new(
            StoreConfig::default().with_cleanup_interval(Duration::from_millis(5)),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.close())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!store.is_sweeping());
    }

    #[test]
    fn test_shard_count_rounding() {
        for (requested, expected) in [(0, 1), (1, 1), (3, 4), (16, 16), (17, 32)] {
            let store: Store<String, String> =
                Store::new(StoreConfig::default().with_shards(requested));
            assert_eq!(store.shard_count(), expected);
        }
    }

    #[test]
    fn test_shard_index_is_hash_and_mask() {
        let store: Store<String, String> = Store::new(StoreConfig::default().with_shards(16));
        for i in 0..100 {
            let key = format!("key:{}", i);
            assert_eq!(store.shard_index(&key), (key.shard_hash() & 15) as usize);
        }

        let ints: Store<u64, u64> = Store::new(StoreConfig::default().with_shards(8));
        assert_eq!(ints.shard_index(&0x0000_0001_0000_0002), 3);
    }

    #[test]
    fn test_padded_store_behaves_the_same() {
        let store: Store<String, String> =
            Store::new(StoreConfig::default().with_shard_padding(true));

        store.set(s("a"), s("1"));
        store.set_with_ttl(s("b"), s("2"), Duration::from_millis(10));
        assert_eq!(store.get(&s("a")), Some(s("1")));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.get(&s("b")), None);
        assert_eq!(store.len(), 1);
        assert!(store.delete(&s("a")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let store: Arc<Store<String, String>> = Arc::new(Store::new(
            StoreConfig::default().with_shards(8).with_shard_padding(true),
        ));
        let mut handles = vec![];

        // Every thread writes 100 keys, then deletes the even ones
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    store.set(key.clone(), s("value"));
                    assert_eq!(store.get(&key), Some(s("value")));
                }
                for j in (0..100).step_by(2) {
                    assert!(store.delete(&format!("key-{}-{}", i, j)));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_concurrent_access_with_eviction_and_sweeper() {
        let lru = Arc::new(LruEvictor::<String>::new(200));
        let store: Arc<Store<String, String>> = Arc::new(Store::new(
            StoreConfig::default().with_cleanup_interval(Duration::from_millis(5)),
        ));
        store.set_evictor(lru.clone());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..500 {
                        let key = format!("k{}-{}", i, j % 100);
                        match j % 4 {
                            0 => store.set_with_ttl(key, s("v"), Duration::from_millis(2)),
                            1 => store.set(key, s("v")),
                            2 => {
                                store.get(&key);
                            }
                            _ => {
                                store.delete(&key);
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        store.close();

        assert!(lru.len() <= 200);
    }

    #[test]
    fn test_integer_and_byte_keys() {
        let ints: Store<i64, &'static str> = Store::default();
        ints.set(-5, "neg");
        ints.set(1 << 40, "big");
        assert_eq!(ints.get(&-5), Some("neg"));
        assert_eq!(ints.get(&(1 << 40)), Some("big"));

        let raw: Store<bytes::Bytes, Vec<u8>> = Store::default();
        raw.set(bytes::Bytes::from_static(b"\x00\xff"), vec![1, 2, 3]);
        assert_eq!(
            raw.get(&bytes::Bytes::from_static(b"\x00\xff")),
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_keys_distribute_over_shards() {
        let store: Store<String, u32> = Store::new(StoreConfig::default().with_shards(16));
        let used: HashSet<usize> = (0..1000)
            .map(|i| store.shard_index(&format!("k{}", i)))
            .collect();
        assert_eq!(used.len(), 16);
    }

    #[test]
    fn test_logging_through_configured_dispatch() {
        let logs = LogBuffer::default();
        let store: Store<String, String> =
            Store::new(StoreConfig::default().with_logger(logs.dispatch()))
                .with_evictor(LruEvictor::new(1));

        store.set(s("a"), s("1"));
        store.set(s("a"), s("2"));
        store.set(s("b"), s("3"));

        let out = logs.contents();
        assert!(out.contains("store.set"));
        assert!(out.contains("store.update"));
        assert!(out.contains("store.evict"));
        assert!(out.contains("count=1"));
    }

    #[test]
    fn test_no_logger_is_silent() {
        let logs = LogBuffer::default();
        let store = string_store();

        tracing::dispatcher::with_default(&logs.dispatch(), || {
            store.set(s("a"), s("1"));
            store.set(s("a"), s("2"));
        });

        assert!(logs.contents().is_empty());
    }
}
