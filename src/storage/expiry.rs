//! Background Expiry Sweeper
//!
//! Lazy expiry only removes a key when somebody reads it. A key that expires
//! and is never read again would stay in memory forever, so a background
//! thread periodically sweeps every shard for expired entries.
//!
//! ## Design
//!
//! The sweeper runs on its own OS thread and waits on two channels at once:
//!
//! ```text
//!            ┌──────────────┐
//!   tick ───>│              │───> sweep all shards
//!            │   select!    │
//!   stop ───>│              │───> exit immediately
//!            └──────────────┘
//! ```
//!
//! Stopping never waits for the next tick. [`ExpirySweeper::stop`] signals
//! the thread and joins it, so once it returns no sweep is running.

use crossbeam::channel::{self, select, Receiver, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Name of the sweeper thread.
pub const SWEEPER_THREAD_NAME: &str = "kavos-sweeper";

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper thread is stopped and joined.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts a thread calling `sweep` every `interval`.
    ///
    /// # Example
    ///
    /// ```
    /// use kavos::storage::ExpirySweeper;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let sweeps = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&sweeps);
    /// let mut sweeper = ExpirySweeper::start(Duration::from_millis(5), move || {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// })
    /// .unwrap();
    ///
    /// std::thread::sleep(Duration::from_millis(50));
    /// sweeper.stop();
    /// assert!(sweeps.load(Ordering::Relaxed) > 0);
    /// ```
    pub fn start<F>(interval: Duration, sweep: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name(SWEEPER_THREAD_NAME.to_string())
            .spawn(move || sweeper_loop(interval, shutdown_rx, sweep))?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Whether the sweeper thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the sweeper and waits for its thread to exit.
    ///
    /// Calling this more than once is harmless.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // A full channel or a dead receiver both mean the thread is
            // already on its way out; dropping the sender disconnects anyway.
            let _ = tx.try_send(());
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Expiry sweeper thread panicked");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
fn sweeper_loop<F: Fn()>(interval: Duration, shutdown_rx: Receiver<()>, sweep: F) {
    let ticker = channel::tick(interval);
    debug!(
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "Expiry sweeper started"
    );

    loop {
        select! {
            recv(shutdown_rx) -> _ => {
                debug!("Expiry sweeper received shutdown signal");
                return;
            }
            recv(ticker) -> _ => sweep(),
        }
    }
}
