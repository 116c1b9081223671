//! Store Configuration

use crate::metrics::{Metrics, NoopMetrics};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Dispatch;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Configuration for a [`Store`](crate::storage::Store).
///
/// # Example
///
/// ```
/// use kavos::metrics::SimpleMetrics;
/// use kavos::storage::StoreConfig;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_shards(32)
///     .with_cleanup_interval(Duration::from_secs(1))
///     .with_metrics(Arc::new(SimpleMetrics::new()))
///     .with_shard_padding(true);
/// assert_eq!(config.shards, 32);
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    /// Requested shard count, rounded up to a power of two (0 becomes 1)
    pub shards: usize,

    /// Interval of the background expiry sweep (zero disables it)
    pub cleanup_interval: Duration,

    /// Where store events are logged (None = not logged)
    pub logger: Option<Dispatch>,

    /// Where store metrics are reported
    pub metrics: Arc<dyn Metrics>,

    /// Pad every shard to its own cache line
    pub shard_padding: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            cleanup_interval: Duration::ZERO,
            logger: None,
            metrics: Arc::new(NoopMetrics),
            shard_padding: false,
        }
    }
}

impl StoreConfig {
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Logs store events to the given dispatcher.
    pub fn with_logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    /// Logs store events to whatever subscriber is current on this thread.
    pub fn with_current_logger(mut self) -> Self {
        self.logger = Some(tracing::dispatcher::get_default(|d| d.clone()));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_shard_padding(mut self, enabled: bool) -> Self {
        self.shard_padding = enabled;
        self
    }

    /// Runs `event` under the configured logger, or skips it.
    #[inline]
    pub(crate) fn log(&self, event: impl FnOnce()) {
        if let Some(dispatch) = &self.logger {
            tracing::dispatcher::with_default(dispatch, event);
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("shards", &self.shards)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("logger", &self.logger.is_some())
            .field("shard_padding", &self.shard_padding)
            .finish_non_exhaustive()
    }
}
