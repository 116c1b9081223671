//! kavos - A Sharded In-Memory Key-Value Store
//!
//! This is the main entry point for the kavos HTTP server.
//! It builds the store from the command line and environment, serves it over
//! HTTP and drains gracefully on Ctrl+C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use kavos::metrics::{Metrics, PromMetrics, SimpleMetrics};
use kavos::server::{self, AppState, KvStore};
use kavos::storage::{LruEvictor, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Time in-flight requests get to answer after being canceled.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// kavos - Sharded In-Memory Key-Value Store
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "KAVOS_HTTP_ADDR", default_value = kavos::DEFAULT_HTTP_ADDR)]
    addr: String,

    /// Number of shards (rounded up to a power of two)
    #[arg(long, default_value_t = 16)]
    shards: usize,

    /// Expiry sweep interval in milliseconds (0 = lazy expiry only)
    #[arg(long, default_value_t = 1000)]
    cleanup_interval_ms: u64,

    /// LRU capacity (0 = no eviction)
    #[arg(long, default_value_t = 10_000)]
    lru_capacity: usize,

    /// Pad each shard to its own cache line
    #[arg(long)]
    shard_padding: bool,

    /// Metrics sink: "simple" or "prometheus"
    #[arg(long, env = "METRICS", default_value = "simple")]
    metrics: String,

    /// How long to wait for open requests on shutdown, e.g. "10s", "500ms"
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "10s")]
    shutdown_timeout: String,

    /// Per-request timeout in seconds (0 = none)
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,
}

/// Parses `"250ms"`, `"10s"`, `"2m"` or a bare number of seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => raw.split_at(at),
        None => (raw, "s"),
    };
    let n: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        _ => None,
    }
}

fn init_tracing() {
    // RUST_LOG wins; otherwise LOG_LEVEL=debug turns on debug output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match std::env::var("LOG_LEVEL").as_deref() {
            Ok("debug") => "debug",
            _ => "info",
        };
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_banner(addr: &str) {
    println!(
        r#"
kavos v{} - Sharded In-Memory Key-Value Store
──────────────────────────────────────────────
HTTP API listening on {}

Use Ctrl+C to shutdown gracefully.
"#,
        kavos::VERSION,
        addr
    );
}

/// Resolves once Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    // Metrics sink
    let prom = if args.metrics == "prometheus" {
        let prom = PromMetrics::new(kavos::METRICS_NAMESPACE)
            .context("failed to register Prometheus metrics")?;
        Some(Arc::new(prom))
    } else {
        None
    };
    let metrics: Arc<dyn Metrics> = match &prom {
        Some(prom) => prom.clone(),
        None => Arc::new(SimpleMetrics::new()),
    };

    // Create the store (shared across all requests)
    let config = StoreConfig::default()
        .with_shards(args.shards)
        .with_cleanup_interval(Duration::from_millis(args.cleanup_interval_ms))
        .with_shard_padding(args.shard_padding)
        .with_metrics(metrics)
        .with_current_logger();
    let store = Arc::new(KvStore::new(config));
    if args.lru_capacity > 0 {
        store.set_evictor(Arc::new(LruEvictor::<String>::new(args.lru_capacity)));
    }
    info!(
        shards = store.shard_count(),
        cleanup_interval_ms = args.cleanup_interval_ms,
        lru_capacity = args.lru_capacity,
        metrics = if prom.is_some() { "prometheus" } else { "simple" },
        "Store initialized"
    );

    let mut state = AppState::new(Arc::clone(&store))
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs));
    if let Some(prom) = prom {
        state = state.with_prometheus(prom);
    }

    let shutdown_timeout = match parse_duration(&args.shutdown_timeout) {
        Some(d) if !d.is_zero() => d,
        _ => {
            warn!(value = %args.shutdown_timeout, "Invalid shutdown timeout, using default");
            DEFAULT_SHUTDOWN_TIMEOUT
        }
    };

    // Bind the TCP listener
    let listener = TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    print_banner(&args.addr);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = server::serve(listener, state.clone(), async move {
        let _ = stop_rx.await;
    });
    tokio::pin!(serve);

    let graceful = tokio::select! {
        result = &mut serve => {
            result.context("HTTP server failed")?;
            true
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining...");
            state.set_draining(true);
            let _ = stop_tx.send(());

            info!(timeout = ?shutdown_timeout, "server.shutdown.wait");
            match tokio::time::timeout(shutdown_timeout, &mut serve).await {
                Ok(result) => {
                    result.context("HTTP server failed during shutdown")?;
                    true
                }
                Err(_) => {
                    warn!("Shutdown timeout elapsed, canceling open requests");
                    state.cancel_in_flight();
                    if tokio::time::timeout(CANCEL_GRACE, &mut serve).await.is_err() {
                        warn!("Connections still open, closing anyway");
                    }
                    false
                }
            }
        }
    };

    store.close();
    info!(graceful, "Server shutdown complete");
    Ok(())
}
