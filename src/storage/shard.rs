//! Shards and Entries
//!
//! A shard is one `RwLock`-guarded `HashMap`. Readers share the lock, writers
//! take it exclusively, and no shard ever touches another shard's lock.
//!
//! ## Layouts
//!
//! ```text
//! Compact:  [ lock|map ][ lock|map ][ lock|map ] ...
//! Padded:   [ lock|map |....pad....][ lock|map |....pad....] ...
//! ```
//!
//! The padded layout gives every shard its own cache line, so threads writing
//! to neighbouring shards do not invalidate each other's lock word. Both
//! layouts behave identically.

use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A stored value with an optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    /// Creates an entry that never expires.
    pub fn new(value: V) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry expiring `ttl` from now.
    ///
    /// A zero TTL means no expiry, and so does a TTL too large for the
    /// platform's `Instant` to represent.
    pub fn with_ttl(value: V, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        Self { value, expires_at }
    }

    /// Checks whether this entry has expired at `now`.
    ///
    /// An entry is expired at and after its expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Checks whether this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// Outcome of a read-locked lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Missing,
    /// Present but stale; carries the stale entry's expiry stamp
    Expired(Instant),
    Live(V),
}

/// A single shard containing a portion of the key space.
#[derive(Debug)]
pub struct Shard<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for Shard<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Shard<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an entry under the read lock.
    pub fn get(&self, key: &K) -> Option<Entry<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Looks up `key` under the read lock, cloning the value only if live.
    pub fn lookup(&self, key: &K, now: Instant) -> Lookup<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            None => Lookup::Missing,
            Some(entry) => match entry.expires_at {
                Some(exp) if exp <= now => Lookup::Expired(exp),
                _ => Lookup::Live(entry.value.clone()),
            },
        }
    }

    /// Writes an entry, returning whether the key was already present.
    pub fn set(&self, key: K, entry: Entry<V>) -> bool {
        self.entries.write().insert(key, entry).is_some()
    }

    /// Removes a key, returning whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Removes `key` only if its entry still carries `expires_at`.
    ///
    /// Used by lazy expiry: between the read that found the entry stale and
    /// this write lock, another writer may have refreshed the key. A refreshed
    /// entry carries a different stamp and is left alone.
    pub fn remove_if_stamp(&self, key: &K, expires_at: Option<Instant>) -> bool {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(current) if current.expires_at == expires_at => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Removes every entry expired at `now` and returns the removed keys.
    pub fn drain_expired(&self, now: Instant) -> Vec<K>
    where
        K: Clone,
    {
        let mut entries = self.entries.write();
        let mut expired = Vec::new();
        entries.retain(|key, entry| {
            if entry.is_expired_at(now) {
                expired.push(key.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Counts entries that are not expired at `now`.
    pub fn live_count(&self, now: Instant) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    /// Raw number of entries, expired or not.
    pub fn raw_len(&self) -> usize {
        self.entries.read().len()
    }
}

/// The shard array in one of its two physical layouts.
#[derive(Debug)]
pub enum Shards<K, V> {
    Compact(Box<[Shard<K, V>]>),
    Padded(Box<[CachePadded<Shard<K, V>>]>),
}

impl<K, V> Shards<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Allocates `count` empty shards.
    pub fn new(count: usize, padded: bool) -> Self {
        if padded {
            Self::Padded((0..count).map(|_| CachePadded::new(Shard::new())).collect())
        } else {
            Self::Compact((0..count).map(|_| Shard::new()).collect())
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Shard<K, V> {
        match self {
            Self::Compact(shards) => &shards[index],
            Self::Padded(shards) => &*shards[index],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Compact(shards) => shards.len(),
            Self::Padded(shards) => shards.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_padded(&self) -> bool {
        matches!(self, Self::Padded(_))
    }

    /// Iterates the shards in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Shard<K, V>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}
