//! Runtime context for a function deployment.
//!
//! The [`RuntimeContext`] is an immutable snapshot describing how the process
//! should serve its functions. It is normally supplied by the platform as JSON
//! in the `FUNC_CONTEXT` environment variable:
//!
//! ```json
//! {
//!   "name": "sender",
//!   "version": "v1.0.0",
//!   "runtime": "Async",
//!   "port": "8080",
//!   "httpPattern": "/",
//!   "prePlugins": ["plugin-example"],
//!   "postPlugins": ["plugin-example"],
//!   "inputs": {
//!     "cron": { "componentName": "cron-input", "componentType": "bindings.cron" }
//!   },
//!   "outputs": {
//!     "target": { "componentName": "kafka-out", "componentType": "bindings.kafka", "operation": "create" }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ConfigError;

/// Environment variable carrying the JSON runtime context.
pub const FUNC_CONTEXT_ENV: &str = "FUNC_CONTEXT";

/// Environment variable selecting the deployed function by name.
pub const FUNCTION_TARGET_ENV: &str = "FUNCTION_TARGET";

/// How the process serves its functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RuntimeKind {
    /// Synchronous serving over HTTP (request/response, CloudEvents).
    #[default]
    #[serde(rename = "Knative", alias = "HTTPServing", alias = "knative")]
    HttpServing,

    /// Asynchronous serving driven by a message transport.
    #[serde(rename = "Async", alias = "AsyncServing", alias = "async")]
    AsyncServing,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::HttpServing => write!(f, "Knative"),
            RuntimeKind::AsyncServing => write!(f, "Async"),
        }
    }
}

/// The category of an input or output component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// An input/output binding (`bindings.*`).
    Binding,
    /// A publish/subscribe topic (`pubsub.*`).
    PubSub,
    /// Anything else; treated like a binding.
    Other,
}

/// A declared input or output component.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Name of the component known to the transport.
    pub component_name: String,

    /// Component type, e.g. `bindings.kafka` or `pubsub.natsstreaming`.
    pub component_type: String,

    /// Topic for pub/sub components, or an address for bindings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Binding operation, e.g. `create`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Extra metadata forwarded to the transport.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ComponentSpec {
    /// Create a component with the given name and type.
    pub fn new(component_name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            component_type: component_type.into(),
            uri: None,
            operation: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the uri (topic for pub/sub).
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the binding operation.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Classify the component by its type prefix.
    pub fn kind(&self) -> ComponentKind {
        if self.component_type.starts_with("bindings.") {
            ComponentKind::Binding
        } else if self.component_type.starts_with("pubsub.") {
            ComponentKind::PubSub
        } else {
            ComponentKind::Other
        }
    }

    /// The pub/sub topic; falls back to the component name.
    pub fn topic(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.component_name)
    }
}

/// Immutable configuration snapshot for the process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeContext {
    /// Deployment name.
    #[serde(default)]
    pub name: String,

    /// Deployment version.
    #[serde(default)]
    pub version: String,

    /// Serving mode.
    #[serde(default)]
    pub runtime: RuntimeKind,

    /// Listening port. Accepts a JSON string or number.
    #[serde(default = "defaults::port", deserialize_with = "de_port")]
    pub port: u16,

    /// Default HTTP path pattern for functions that do not set one.
    #[serde(default = "defaults::http_pattern")]
    pub http_pattern: String,

    /// Plugins run before the handler, in order.
    #[serde(default)]
    pub pre_plugins: Vec<String>,

    /// Plugins run after the handler, in order.
    #[serde(default)]
    pub post_plugins: Vec<String>,

    /// Declared inputs by name.
    #[serde(default)]
    pub inputs: BTreeMap<String, ComponentSpec>,

    /// Declared outputs by name.
    #[serde(default)]
    pub outputs: BTreeMap<String, ComponentSpec>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            runtime: RuntimeKind::default(),
            port: defaults::port(),
            http_pattern: defaults::http_pattern(),
            pre_plugins: Vec::new(),
            post_plugins: Vec::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl RuntimeContext {
    /// Parse a runtime context from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let ctx: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::parse(FUNC_CONTEXT_ENV, e.to_string()))?;
        ctx.validate()?;
        Ok(ctx)
    }

    /// Read the runtime context from the `FUNC_CONTEXT` environment variable.
    ///
    /// Returns `Ok(None)` when the variable is not set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match std::env::var(FUNC_CONTEXT_ENV) {
            Ok(json) if !json.trim().is_empty() => Self::from_json(&json).map(Some),
            _ => Ok(None),
        }
    }

    /// Check values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.http_pattern.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "httpPattern",
                format!("'{}' must start with '/'", self.http_pattern),
            ));
        }

        for (name, spec) in self.inputs.iter().chain(self.outputs.iter()) {
            if spec.component_name.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("{name}.componentName"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Builder-style setter for the runtime kind.
    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }

    /// Builder-style setter for the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder-style setter for the plugin lists.
    pub fn with_plugins(mut self, pre: Vec<String>, post: Vec<String>) -> Self {
        self.pre_plugins = pre;
        self.post_plugins = post;
        self
    }

    /// Declare an input component.
    pub fn with_input(mut self, name: impl Into<String>, spec: ComponentSpec) -> Self {
        self.inputs.insert(name.into(), spec);
        self
    }

    /// Declare an output component.
    pub fn with_output(mut self, name: impl Into<String>, spec: ComponentSpec) -> Self {
        self.outputs.insert(name.into(), spec);
        self
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn http_pattern(&self) -> &str {
        &self.http_pattern
    }

    pub fn pre_plugins(&self) -> &[String] {
        &self.pre_plugins
    }

    pub fn post_plugins(&self) -> &[String] {
        &self.post_plugins
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn inputs(&self) -> &BTreeMap<String, ComponentSpec> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, ComponentSpec> {
        &self.outputs
    }

    /// Look up a declared output by name.
    pub fn output(&self, name: &str) -> Option<&ComponentSpec> {
        self.outputs.get(name)
    }
}

fn de_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{text}'"))),
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn port() -> u16 {
        8080
    }

    pub fn http_pattern() -> String {
        "/".to_string()
    }
}
