//! Function entries and handler shapes.
//!
//! A [`FunctionEntry`] pairs a unique name and routing information with a
//! [`Handler`]. The handler's trigger kind is decided once, when the entry is
//! built, by which of the three handler traits it wraps:
//!
//! - [`HttpFunction`]: `(response sink, request)`, served over synchronous HTTP
//! - [`CloudEventFunction`]: `(context, event) -> error`
//! - [`OpenFunction`]: `(context, bytes) -> (Out, error)`, served from async
//!   bindings or synchronously over HTTP

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;

use func_runtime_common::{FunctionError, RegistrationError};

use crate::context::{HttpRequest, InvocationContext, Out, ResponseWriter};
use crate::event::CloudEvent;

/// The structural category of a function's trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// Synchronous HTTP request.
    Http,
    /// CloudEvent delivery.
    CloudEvent,
    /// Asynchronous message or binding consumption.
    AsyncBinding,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Http => "http",
            TriggerKind::CloudEvent => "cloudevent",
            TriggerKind::AsyncBinding => "binding",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plain HTTP function writing into a response sink.
#[async_trait]
pub trait HttpFunction: Send + Sync {
    async fn call(&self, w: &mut ResponseWriter, req: &HttpRequest);
}

/// A structured function: bytes in, [`Out`] back.
///
/// The context gives access to path variables, the triggering event and
/// [`InvocationContext::send`] for declared outputs.
#[async_trait]
pub trait OpenFunction: Send + Sync {
    async fn call(&self, ctx: &InvocationContext, input: Bytes) -> Result<Out, FunctionError>;
}

/// A function receiving CloudEvents.
#[async_trait]
pub trait CloudEventFunction: Send + Sync {
    async fn call(&self, ctx: &InvocationContext, event: &CloudEvent) -> Result<(), FunctionError>;
}

/// A user handler tagged with its trigger kind.
#[derive(Clone)]
pub enum Handler {
    /// Synchronous HTTP handler.
    Http(Arc<dyn HttpFunction>),
    /// CloudEvent handler.
    CloudEvent(Arc<dyn CloudEventFunction>),
    /// Structured handler for async bindings (and sync HTTP).
    AsyncBinding(Arc<dyn OpenFunction>),
}

impl Handler {
    pub fn http(f: impl HttpFunction + 'static) -> Self {
        Self::Http(Arc::new(f))
    }

    pub fn cloud_event(f: impl CloudEventFunction + 'static) -> Self {
        Self::CloudEvent(Arc::new(f))
    }

    pub fn open_function(f: impl OpenFunction + 'static) -> Self {
        Self::AsyncBinding(Arc::new(f))
    }

    /// The trigger kind this handler serves.
    pub fn trigger_kind(&self) -> TriggerKind {
        match self {
            Handler::Http(_) => TriggerKind::Http,
            Handler::CloudEvent(_) => TriggerKind::CloudEvent,
            Handler::AsyncBinding(_) => TriggerKind::AsyncBinding,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.trigger_kind()).finish()
    }
}

/// A registered, deployable function.
///
/// Immutable once built.
#[derive(Clone)]
pub struct FunctionEntry {
    name: String,
    path: Option<String>,
    methods: Vec<Method>,
    handler: Handler,
}

impl FunctionEntry {
    /// Start building an entry with the given name.
    pub fn builder(name: impl Into<String>) -> FunctionBuilder {
        FunctionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entry's own path pattern, if it set one.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The path pattern, falling back to the deployment default.
    pub fn path_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.path.as_deref().unwrap_or(default)
    }

    /// Accepted methods; empty means any.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.handler.trigger_kind()
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("trigger", &self.trigger_kind())
            .finish()
    }
}

/// Builder for [`FunctionEntry`].
pub struct FunctionBuilder {
    name: String,
    path: Option<String>,
    methods: Vec<Method>,
    handler: Option<Handler>,
}

impl FunctionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            methods: Vec::new(),
            handler: None,
        }
    }

    /// Set the path pattern, e.g. `/items/{id}`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Accept the given method. May be called repeatedly.
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Accept the given methods.
    pub fn methods(self, methods: impl IntoIterator<Item = Method>) -> Self {
        methods.into_iter().fold(self, Self::method)
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn http(self, f: impl HttpFunction + 'static) -> Self {
        self.handler(Handler::http(f))
    }

    pub fn cloud_event(self, f: impl CloudEventFunction + 'static) -> Self {
        self.handler(Handler::cloud_event(f))
    }

    pub fn open_function(self, f: impl OpenFunction + 'static) -> Self {
        self.handler(Handler::open_function(f))
    }

    /// Validate and build the entry.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if the name is empty or contains whitespace or `/`
    /// - `InvalidPath` if the path pattern is malformed
    /// - `UnrecognizedFunction` if no handler was supplied
    pub fn build(self) -> Result<FunctionEntry, RegistrationError> {
        if self.name.is_empty() || self.name.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(RegistrationError::InvalidName { name: self.name });
        }

        if let Some(path) = &self.path {
            path_variables(path)?;
        }

        let Some(handler) = self.handler else {
            return Err(RegistrationError::unrecognized(
                self.name,
                "no HTTP, CloudEvent or structured handler supplied",
            ));
        };

        Ok(FunctionEntry {
            name: self.name,
            path: self.path,
            methods: self.methods,
            handler,
        })
    }
}

/// Parse a path pattern and return its variable names in order.
///
/// Segments of the form `{name}` capture one segment; a trailing `{*name}`
/// captures the rest of the path.
pub fn path_variables(pattern: &str) -> Result<Vec<String>, RegistrationError> {
    if !pattern.starts_with('/') {
        return Err(RegistrationError::invalid_path(pattern, "must start with '/'"));
    }

    let segments: Vec<&str> = pattern.split('/').skip(1).collect();
    let mut names = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let has_brace = segment.contains('{') || segment.contains('}');
        if !has_brace {
            continue;
        }

        let inner = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .filter(|s| !s.contains('{') && !s.contains('}'))
            .ok_or_else(|| {
                RegistrationError::invalid_path(pattern, format!("malformed segment '{segment}'"))
            })?;

        let name = match inner.strip_prefix('*') {
            Some(rest) if i + 1 == segments.len() => rest,
            Some(_) => {
                return Err(RegistrationError::invalid_path(
                    pattern,
                    "catch-all must be the last segment",
                ));
            }
            None => inner,
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RegistrationError::invalid_path(
                pattern,
                format!("invalid variable name '{name}'"),
            ));
        }
        if names.iter().any(|n| n == name) {
            return Err(RegistrationError::invalid_path(
                pattern,
                format!("duplicate variable '{name}'"),
            ));
        }
        names.push(name.to_string());
    }

    Ok(names)
}
