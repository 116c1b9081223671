//! Storage Engine Module
//!
//! This module provides the core storage functionality for kavos: a sharded,
//! thread-safe key-value store with per-key TTL, a pluggable eviction policy
//! and a background expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! │       shard = fnv1a(key) & (N - 1)                          │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                                  │
//!          │                                  ▼
//! ┌────────┴────────┐              ┌─────────────────────┐
//! │  ExpirySweeper  │              │ Evictor (e.g. LRU)  │
//! │  (OS thread)    │              │ Metrics / Logger    │
//! └─────────────────┘              └─────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: power-of-two shard count, optional cache-line padding
//! - **TTL Support**: lazy expiry on read plus an active sweep
//! - **Eviction**: any [`Evictor`], with [`LruEvictor`] built in
//! - **Observability**: pluggable [`Metrics`](crate::metrics::Metrics) and a
//!   `tracing` dispatcher per store
//!
//! ## Example
//!
//! ```
//! use kavos::storage::{LruEvictor, Store, StoreConfig};
//! use std::time::Duration;
//!
//! let store: Store<u64, &str> = Store::new(
//!     StoreConfig::default()
//!         .with_shards(16)
//!         .with_cleanup_interval(Duration::from_secs(1)),
//! )
//! .with_evictor(LruEvictor::new(1_000));
//!
//! store.set_with_ttl(42u64, "answer", Duration::from_secs(3600));
//! assert_eq!(store.get(&42), Some("answer"));
//!
//! store.close();
//! ```

pub mod config;
pub mod engine;
pub mod evictor;
pub mod expiry;
pub mod hash;
pub mod shard;

// Re-export commonly used types
pub use config::{StoreConfig, DEFAULT_SHARDS};
pub use engine::{Store, StoreKey, StoreValue};
pub use evictor::{Evictor, LruEvictor};
pub use expiry::ExpirySweeper;
pub use hash::{fnv1a_32, hash_display, next_power_of_two, ByDisplay, ShardKey};
pub use shard::{Entry, Lookup, Shard, Shards};
