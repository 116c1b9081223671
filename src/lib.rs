//! # kavos - A Sharded In-Memory Key-Value Store
//!
//! kavos is a concurrent, in-memory key-value store with per-key TTL, a
//! pluggable eviction policy and a thin HTTP CRUD layer.
//!
//! ## Features
//!
//! - **Sharded Storage**: independent `RwLock`s over a power-of-two shard array
//! - **TTL Support**: lazy expiry on read plus a background sweep
//! - **Eviction**: a global LRU spanning all shards, or your own policy
//! - **Observability**: `tracing` events and no-op / atomic / Prometheus metrics
//! - **HTTP API**: axum routes with JSON envelopes and graceful draining
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               kavos                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ HTTP Server │───>│ Middleware  │───>│  Handlers   │                  │
//! │  │   (axum)    │    │ id/log/...  │    │  /kvs/:key  │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │  Evictor    │<───│                    Store                     │    │
//! │  │   (LRU)     │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  └─────────────┘    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │  ┌─────────────┐    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │    │
//! │  │  Metrics    │<───│  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │  └─────────────┘    └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper (OS thread)             │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use kavos::metrics::SimpleMetrics;
//! use kavos::storage::{LruEvictor, Store, StoreConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let metrics = Arc::new(SimpleMetrics::new());
//! let store: Store<String, String> = Store::new(
//!     StoreConfig::default()
//!         .with_shards(16)
//!         .with_cleanup_interval(Duration::from_secs(1))
//!         .with_metrics(metrics.clone()),
//! )
//! .with_evictor(LruEvictor::new(10_000));
//!
//! store.set("user:1".into(), "ariz".into());
//! assert_eq!(store.get(&"user:1".into()), Some("ariz".to_string()));
//! assert_eq!(metrics.snapshot().get_hit, 1);
//!
//! store.close();
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the sharded store, TTL sweeper and eviction policies
//! - [`metrics`]: metric sinks the store reports to
//! - [`server`]: the HTTP boundary
//!
//! ## Design Highlights
//!
//! ### Lock Discipline
//!
//! A shard lock is only held for the map operation itself. The evictor,
//! metrics and logger are notified after it is released, so a shard lock
//! and the evictor lock are never held at the same time.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is read, we check if it's expired
//! 2. **Active**: A background thread periodically sweeps for expired keys
//!
//! This ensures memory is reclaimed even for keys that are never read again.

pub mod metrics;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use metrics::{Metrics, NoopMetrics, PromMetrics, SimpleMetrics};
pub use server::{AppError, AppState};
pub use storage::{Evictor, ExpirySweeper, LruEvictor, Store, StoreConfig};

/// The default address the HTTP server binds to
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Namespace of the Prometheus metrics
pub const METRICS_NAMESPACE: &str = "kavos";

/// Version of kavos
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
