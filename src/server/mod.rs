//! HTTP Server
//!
//! A thin REST layer over a [`Store<String, String>`](crate::storage::Store),
//! built on axum.
//!
//! ## Routes
//!
//! | Method   | Path           | Action                                    |
//! |----------|----------------|-------------------------------------------|
//! | `PUT`    | `/kvs/{key}`   | set, body `{"value": ".."}`, `?ttl=<sec>` |
//! | `GET`    | `/kvs/{key}`   | get (404 when missing or expired)         |
//! | `DELETE` | `/kvs/{key}`   | delete                                    |
//! | `GET`    | `/health`      | 200 `ok`, 503 `draining`                  |
//! | `GET`    | `/metrics`     | Prometheus text (404 when disabled)       |
//!
//! Successful responses are wrapped as `{"data": ...}`, failures as
//! `{"error": {"status", "code", "message"}}`.

pub mod error;
pub mod handlers;
pub mod middleware;

use axum::{
    routing::{get, put},
    Router,
};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::metrics::PromMetrics;
use crate::storage::Store;

pub use error::AppError;

/// The store served over HTTP.
pub type KvStore = Store<String, String>;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KvStore>,
    /// Scrape target for `/metrics`, when running with Prometheus
    pub prom: Option<Arc<PromMetrics>>,
    /// Set once shutdown begins; `/health` then reports 503
    pub draining: Arc<AtomicBool>,
    /// Flipped to `true` to abort requests still in flight
    cancel: Arc<watch::Sender<bool>>,
    /// Per-request timeout (zero disables it)
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<KvStore>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            store,
            prom: None,
            draining: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(cancel),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_prometheus(mut self, prom: Arc<PromMetrics>) -> Self {
        self.prom = Some(prom);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn set_draining(&self, draining: bool) {
        self.draining.store(draining, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Answers every in-flight request with `CANCELED`.
    pub fn cancel_in_flight(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("prometheus", &self.prom.is_some())
            .field("draining", &self.is_draining())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Builds the routes without middleware or state.
fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/kvs/:key",
            put(handlers::put_kv)
                .get(handlers::get_kv)
                .delete(handlers::delete_kv),
        )
        .route(
            "/kvs/",
            put(handlers::empty_key)
                .get(handlers::empty_key)
                .delete(handlers::empty_key),
        )
        .fallback(handlers::not_found)
}

/// Builds the complete application router.
pub fn router(state: AppState) -> Router {
    middleware::apply(routes(), state.clone()).with_state(state)
}

/// Serves `state` on `listener` until `shutdown` resolves, then waits for
/// open requests to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "server.start");
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
