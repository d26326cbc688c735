//! Per-invocation state.
//!
//! This module provides:
//! - [`InvocationContext`]: Mutable state owned by exactly one invocation
//! - [`Out`] and [`StatusKind`]: The function result and its classification
//! - [`ResponseWriter`]: The response sink handed to HTTP functions
//! - [`PathVars`]: Variables captured from the route's path pattern

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use func_runtime_common::{InvocationError, RuntimeContext, TransportError};

use crate::event::{BindingMessage, CloudEvent, EventPayload};
use crate::function::TriggerKind;
use crate::transport::OutputTransport;

/// The native request handle for synchronous HTTP triggers.
pub type HttpRequest = http::Request<Bytes>;

/// Classification of a result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// No status was set.
    Unset,
    /// `200..=399`.
    Success,
    /// Any other code.
    InternalError,
}

/// The result of a function invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Out {
    code: u16,
    data: Bytes,
    headers: Vec<(String, String)>,
    metadata: HashMap<String, String>,
}

impl Out {
    /// Code for a successful invocation.
    pub const SUCCESS: u16 = 200;
    /// Code for a failed invocation.
    pub const INTERNAL_ERROR: u16 = 500;

    pub fn success() -> Self {
        Self::default().with_code(Self::SUCCESS)
    }

    pub fn internal_error() -> Self {
        Self::default().with_code(Self::INTERNAL_ERROR)
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn status_kind(&self) -> StatusKind {
        match self.code {
            0 => StatusKind::Unset,
            200..=399 => StatusKind::Success,
            _ => StatusKind::InternalError,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.status_kind() == StatusKind::Unset
    }
}

/// Path variables captured by the router.
///
/// Also inserted into the request extensions for HTTP functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars(HashMap<String, String>);

impl PathVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for PathVars {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Response sink for HTTP functions.
///
/// Mirrors a classic response writer: the first status written wins, and
/// writing body bytes without a status implies `200 OK`.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, ignoring names or values that are not valid HTTP.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
    }

    pub fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(data);
    }

    /// The status that will be sent.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Convert what was written into an [`Out`].
    pub fn into_out(self) -> Out {
        let status = self.status();
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        Out {
            code: status.as_u16(),
            data: self.body.freeze(),
            headers,
            metadata: HashMap::new(),
        }
    }
}

/// Per-invocation state.
///
/// Created fresh for every trigger occurrence by
/// [`RuntimeManager::new_invocation`](crate::RuntimeManager::new_invocation)
/// and dropped once the adapter has written its response or acked its
/// message. Never shared between invocations.
pub struct InvocationContext {
    request_id: String,
    function: String,
    trigger: TriggerKind,
    runtime: Arc<RuntimeContext>,
    request: Option<HttpRequest>,
    writer: ResponseWriter,
    vars: PathVars,
    event: Option<EventPayload>,
    result: Out,
    error: Option<InvocationError>,
    transport: Option<Arc<dyn OutputTransport>>,
    cancellation: CancellationToken,
    extensions: http::Extensions,
    started_at: Instant,
}

impl InvocationContext {
    /// Create a context for one invocation of `function`.
    pub fn new(function: impl Into<String>, trigger: TriggerKind, runtime: Arc<RuntimeContext>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            function: function.into(),
            trigger,
            runtime,
            request: None,
            writer: ResponseWriter::new(),
            vars: PathVars::new(),
            event: None,
            result: Out::default(),
            error: None,
            transport: None,
            cancellation: CancellationToken::new(),
            extensions: http::Extensions::new(),
            started_at: Instant::now(),
        }
    }

    /// Bind the output transport used by [`send`](Self::send).
    pub fn with_transport(mut self, transport: Arc<dyn OutputTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use the given token as this invocation's cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn function_name(&self) -> &str {
        &self.function
    }

    pub fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    /// Attach the native HTTP request together with its path variables.
    ///
    /// The variables and the cancellation token are also inserted into the
    /// request extensions so plain HTTP functions can reach them.
    pub fn set_http_request(&mut self, mut request: HttpRequest, vars: PathVars) {
        request.extensions_mut().insert(vars.clone());
        request.extensions_mut().insert(self.cancellation.clone());
        self.vars = vars;
        self.request = Some(request);
    }

    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    pub fn set_vars(&mut self, vars: PathVars) {
        self.vars = vars;
    }

    pub fn vars(&self) -> &PathVars {
        &self.vars
    }

    /// Get a single path variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name)
    }

    pub fn set_cloud_event(&mut self, event: CloudEvent) {
        self.event = Some(EventPayload::Cloud(event));
    }

    pub fn set_message(&mut self, message: BindingMessage) {
        self.event = Some(EventPayload::Message(message));
    }

    pub fn event(&self) -> Option<&EventPayload> {
        self.event.as_ref()
    }

    pub fn cloud_event(&self) -> Option<&CloudEvent> {
        match &self.event {
            Some(EventPayload::Cloud(event)) => Some(event),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&BindingMessage> {
        match &self.event {
            Some(EventPayload::Message(message)) => Some(message),
            _ => None,
        }
    }

    /// The input bytes for a structured function.
    ///
    /// The event payload if there is one, otherwise the request body.
    pub fn input(&self) -> Bytes {
        match (&self.event, &self.request) {
            (Some(event), _) => event.data(),
            (None, Some(request)) => request.body().clone(),
            (None, None) => Bytes::new(),
        }
    }

    /// Build a success result (code 200).
    pub fn return_on_success(&self) -> Out {
        Out::success()
    }

    /// Build an internal error result (code 500).
    pub fn return_on_internal_error(&self) -> Out {
        Out::internal_error()
    }

    pub fn result(&self) -> &Out {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut Out {
        &mut self.result
    }

    pub fn set_result(&mut self, out: Out) {
        self.result = out;
    }

    pub fn error(&self) -> Option<&InvocationError> {
        self.error.as_ref()
    }

    /// Replace the recorded error. Post-hooks use this to rewrite or clear it.
    pub fn set_error(&mut self, error: Option<InvocationError>) {
        self.error = error;
    }

    /// Record an error unless one is already recorded.
    ///
    /// Returns `false` if an earlier error was kept.
    pub fn record_error(&mut self, error: InvocationError) -> bool {
        if self.error.is_some() {
            debug!(
                request_id = %self.request_id,
                error = %error,
                "Keeping earlier invocation error"
            );
            return false;
        }
        self.error = Some(error);
        true
    }

    pub fn take_error(&mut self) -> Option<InvocationError> {
        self.error.take()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Send `data` to the declared output named `output`.
    ///
    /// Returns whatever the transport answered with.
    pub async fn send(
        &self,
        output: &str,
        data: impl Into<Bytes> + Send,
    ) -> Result<Bytes, TransportError> {
        let transport = self.transport.as_ref().ok_or(TransportError::NoOutputs)?;
        let component = self
            .runtime
            .output(output)
            .ok_or_else(|| TransportError::UnknownOutput {
                name: output.to_string(),
            })?;
        let data = data.into();

        debug!(
            request_id = %self.request_id,
            output = %output,
            component = %component.component_name,
            transport = transport.name(),
            size = data.len(),
            "Sending to output"
        );

        transport.send(output, component, data).await
    }

    /// Cancellation signal of the owning transport.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Typed per-invocation storage for plugins.
    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Split borrow for running an HTTP function.
    pub(crate) fn http_parts(&mut self) -> Option<(&HttpRequest, &mut ResponseWriter)> {
        let request = self.request.as_ref()?;
        Some((request, &mut self.writer))
    }

    pub(crate) fn take_writer(&mut self) -> ResponseWriter {
        std::mem::take(&mut self.writer)
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("request_id", &self.request_id)
            .field("function", &self.function)
            .field("trigger", &self.trigger)
            .field("result", &self.result)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use func_runtime_common::{FunctionError, HookError, HookStage};

    fn context() -> InvocationContext {
        InvocationContext::new("test", TriggerKind::Http, Arc::new(RuntimeContext::default()))
    }

    #[test]
    fn test_status_kind() {
        assert_eq!(Out::default().status_kind(), StatusKind::Unset);
        assert_eq!(Out::success().status_kind(), StatusKind::Success);
        assert_eq!(Out::default().with_code(302).status_kind(), StatusKind::Success);
        assert_eq!(Out::internal_error().status_kind(), StatusKind::InternalError);
        assert_eq!(Out::default().with_code(404).status_kind(), StatusKind::InternalError);
    }

    #[test]
    fn test_response_writer_defaults() {
        let mut w = ResponseWriter::new();
        assert_eq!(w.status(), StatusCode::OK);

        w.write(b"hello ");
        w.write_header(StatusCode::CREATED);
        w.write(b"world");

        let out = w.into_out();
        assert_eq!(out.code(), 200);
        assert_eq!(out.data(), &Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_response_writer_headers() {
        let mut w = ResponseWriter::new();
        w.set_header("x-custom", "value");
        w.set_header("bad header", "ignored");
        w.write_header(StatusCode::NOT_FOUND);

        let out = w.into_out();
        assert_eq!(out.code(), 404);
        assert_eq!(out.headers(), [("x-custom".to_string(), "value".to_string())]);
    }

    #[test]
    fn test_http_request_carries_vars() {
        let mut ctx = context();
        let request = http::Request::builder()
            .uri("/items/42")
            .body(Bytes::from_static(b"body"))
            .unwrap();
        let vars: PathVars = [("id", "42")].into_iter().collect();

        ctx.set_http_request(request, vars);

        assert_eq!(ctx.var("id"), Some("42"));
        let stored = ctx.request().unwrap();
        assert_eq!(stored.extensions().get::<PathVars>().unwrap().get("id"), Some("42"));
        assert!(stored.extensions().get::<CancellationToken>().is_some());
        assert_eq!(ctx.input(), Bytes::from_static(b"body"));
    }

    #[test]
    fn test_input_prefers_event() {
        let mut ctx = context();
        ctx.set_message(BindingMessage::new("cron", "tick"));
        assert_eq!(ctx.input(), Bytes::from_static(b"tick"));
        assert!(ctx.message().is_some());
        assert!(ctx.cloud_event().is_none());
    }

    #[test]
    fn test_record_error_keeps_first() {
        let mut ctx = context();
        assert!(ctx.record_error(HookError::new("a", HookStage::Pre, "first").into()));
        assert!(!ctx.record_error(FunctionError::failed("second").into()));
        assert!(ctx.error().unwrap().is_hook());

        ctx.set_error(None);
        assert!(ctx.error().is_none());
    }

    #[tokio::test]
    async fn test_send_without_transport() {
        let ctx = context();
        let err = ctx.send("target", "data").await.unwrap_err();
        assert_eq!(err, TransportError::NoOutputs);
    }

    #[test]
    fn test_extensions() {
        let mut ctx = context();
        ctx.extensions_mut().insert(7_u32);
        assert_eq!(ctx.extensions().get::<u32>(), Some(&7));
    }
}
