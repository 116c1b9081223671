//! HTTP route handlers

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::time::Duration;
use tracing::error;

use crate::server::error::{AppError, Data};
use crate::server::AppState;

/// Largest accepted request body (1 MiB).
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// Body of `PUT /kvs/{key}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ValueDto {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PutParams {
    /// Raw so that a malformed value is ignored instead of rejected
    ttl: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
}

/// Parses the `ttl` query value as whole seconds. Anything but a positive
/// integer means "no TTL".
fn parse_ttl(raw: Option<&str>) -> Option<Duration> {
    match raw?.parse::<i64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs.unsigned_abs())),
        _ => None,
    }
}

/// Decodes a JSON body of at most [`MAX_BODY_BYTES`].
///
/// Exactly one JSON value is accepted; trailing values are rejected.
pub async fn decode_json<T: DeserializeOwned>(body: Body) -> Result<T, AppError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::InvalidJson("request body too large".into()))?;

    if bytes.is_empty() {
        return Err(AppError::InvalidJson("empty body".into()));
    }

    let mut de = serde_json::Deserializer::from_slice(&bytes);
    let value = T::deserialize(&mut de).map_err(|e| match e.classify() {
        Category::Syntax | Category::Eof => AppError::InvalidJson("malformed JSON".into()),
        Category::Data => AppError::InvalidJson("type mismatch in JSON".into()),
        Category::Io => AppError::InvalidJson("invalid JSON".into()),
    })?;
    de.end()
        .map_err(|_| AppError::InvalidJson("multiple JSON values".into()))?;

    Ok(value)
}

fn require_key(key: String) -> Result<String, AppError> {
    if key.is_empty() {
        return Err(AppError::BadRequest("empty key".into()));
    }
    Ok(key)
}

/// `PUT /kvs/{key}?ttl=<seconds>`
pub async fn put_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<PutParams>,
    body: Body,
) -> Result<Data<ValueDto>, AppError> {
    let key = require_key(key)?;
    let req: ValueRequest = decode_json(body).await?;

    match parse_ttl(params.ttl.as_deref()) {
        Some(ttl) => state.store.set_with_ttl(key.clone(), req.value.clone(), ttl),
        None => state.store.set(key.clone(), req.value.clone()),
    }

    Ok(Data(ValueDto {
        key,
        value: Some(req.value),
    }))
}

/// `GET /kvs/{key}`
pub async fn get_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Data<ValueDto>, AppError> {
    let key = require_key(key)?;
    let value = state
        .store
        .get(&key)
        .ok_or_else(|| AppError::NotFound("key not found".into()))?;

    Ok(Data(ValueDto {
        key,
        value: Some(value),
    }))
}

/// `DELETE /kvs/{key}`
///
/// Succeeds whether or not the key existed.
pub async fn delete_kv(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Data<ValueDto>, AppError> {
    let key = require_key(key)?;
    state.store.delete(&key);
    Ok(Data(ValueDto { key, value: None }))
}

/// `/kvs/` with nothing after the slash.
pub async fn empty_key() -> AppError {
    AppError::BadRequest("empty key".into())
}

/// `GET /health`
///
/// Reports 503 once the server is draining so load balancers stop routing.
pub async fn health(State(state): State<AppState>) -> Response {
    if state.is_draining() {
        let body = Data(HealthStatus { status: "draining" });
        return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    }
    Data(HealthStatus { status: "ok" }).into_response()
}

/// `GET /metrics` in the Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let prom = state
        .prom
        .as_ref()
        .ok_or_else(|| AppError::NotFound("metrics not enabled".into()))?;

    let text = prom.encode().map_err(|e| {
        error!(error = %e, "metrics.encode.failed");
        AppError::Internal("failed to encode metrics".into())
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::NotFound("route not found".into())
}
