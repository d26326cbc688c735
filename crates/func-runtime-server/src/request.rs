//! HTTP request conversion for function invocation.
//!
//! Axum hands us a streaming body; functions receive an
//! [`HttpRequest`](func_runtime_core::HttpRequest) with the body already
//! buffered, bounded by the configured limit.

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use tracing::warn;

use func_runtime_core::HttpRequest;

use crate::response::FunctionResponse;

/// Buffer the body and rebuild the request around it.
///
/// # Errors
///
/// Returns a ready-to-send 413 response if the body exceeds `limit` or
/// cannot be read.
pub async fn buffer_request(req: Request<Body>, limit: usize) -> Result<HttpRequest, FunctionResponse> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
        warn!(limit, error = %e, "Failed to read request body");
        FunctionResponse::error(413, &format!("Request body exceeds {limit} bytes or could not be read"))
    })?;

    Ok(HttpRequest::from_parts(parts, body))
}

/// Get the Content-Type header.
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Check if the content type is JSON (including `+json` suffixes).
pub fn is_json(headers: &HeaderMap) -> bool {
    content_type(headers).is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or_default().trim();
        essence == "application/json" || essence.ends_with("+json")
    })
}
