//! HTTP response construction.
//!
//! Every response produced for a function invocation carries the
//! [`FUNCTION_STATUS_HEADER`] marker so callers can tell a handler-reported
//! failure from a crash independently of the numeric status code.

use std::fmt;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;

/// Header carrying the invocation outcome.
pub const FUNCTION_STATUS_HEADER: &str = "X-OpenFunction-Status";

/// Outcome reported in [`FUNCTION_STATUS_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionStatus {
    Success,
    Error,
    Crash,
}

impl FunctionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionStatus::Success => "success",
            FunctionStatus::Error => "error",
            FunctionStatus::Crash => "crash",
        }
    }
}

impl fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response before conversion to axum.
#[derive(Debug, Clone)]
pub struct FunctionResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers as key-value pairs
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl FunctionResponse {
    /// Create a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Create a plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, body.into()).with_header("content-type", "text/plain; charset=utf-8")
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string()).with_header("content-type", "application/json")
    }

    /// Create an error response with a JSON body.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    /// Create a response with no body.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Bytes::new())
    }

    /// Add a header to the response.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the outcome marker, replacing any marker already present.
    pub fn with_status_marker(mut self, status: FunctionStatus) -> Self {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case(FUNCTION_STATUS_HEADER));
        self.with_header(FUNCTION_STATUS_HEADER, status.as_str())
    }

    /// Look up a header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Convert to an axum response.
    ///
    /// Invalid status codes become 500; invalid headers are dropped.
    pub fn into_axum_response(self) -> Response<Body> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.append(name, value);
            }
        }

        response
    }
}

impl IntoResponse for FunctionResponse {
    fn into_response(self) -> axum::response::Response {
        self.into_axum_response()
    }
}
