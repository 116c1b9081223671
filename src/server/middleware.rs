//! HTTP middleware
//!
//! Layer order, outermost first:
//!
//! ```text
//! request-id ─> propagate request-id ─> access log ─> catch panic ─> deadline ─> handler
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
};
use tracing::{error, info};

use crate::server::error::AppError;
use crate::server::AppState;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the full middleware stack.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(middleware::from_fn(access_log))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(state, deadline)),
    )
}

fn header_str<'a>(value: Option<&'a HeaderValue>) -> &'a str {
    value.and_then(|v| v.to_str().ok()).unwrap_or("-")
}

/// Logs one `access.log` event per request.
pub async fn access_log(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let request_id = header_str(req.headers().get(REQUEST_ID_HEADER)).to_owned();

    let remote = match req.headers().get("x-forwarded-for") {
        Some(forwarded) => header_str(Some(forwarded)).to_owned(),
        None => req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "-".to_owned()),
    };

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        remote = %remote,
        request_id = %request_id,
        "access.log"
    );

    response
}

/// Turns a handler panic into a 500 response.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "http.panic.recovered");

    AppError::Internal("panic recovered".into()).into_response()
}

/// Bounds each request by the configured timeout and by server shutdown.
///
/// A request still running when shutdown gives up waiting is answered with
/// `CANCELED`; one running past its timeout with `TIMEOUT`.
pub async fn deadline(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let canceled = wait_canceled(state.subscribe_cancel());
    let timeout = state.request_timeout;

    let run = next.run(req);
    let expire = async {
        if timeout.is_zero() {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(timeout).await
        }
    };

    tokio::select! {
        response = run => response,
        () = expire => AppError::Timeout.into_response(),
        () = canceled => AppError::Canceled.into_response(),
    }
}

async fn wait_canceled(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        // Sender gone, nothing can cancel us any more
        std::future::pending::<()>().await;
    }
}
