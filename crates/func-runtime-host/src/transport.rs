//! Output transports.
//!
//! - [`DaprTransport`]: Sends to bindings and pub/sub topics through a
//!   Dapr-compatible sidecar over HTTP
//! - [`ChannelTransport`] / [`ChannelSource`]: In-process broker; whatever is
//!   sent to an output becomes a message on the source

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use func_runtime_common::{ComponentKind, ComponentSpec, ConfigError, TransportConfig, TransportError};
use func_runtime_core::{BindingMessage, OutputTransport};

/// Operation used for bindings that do not declare one.
pub const DEFAULT_OPERATION: &str = "create";

/// Request body for `POST /v1.0/bindings/{name}`.
#[derive(Debug, Serialize)]
struct BindingRequest<'a> {
    data: serde_json::Value,
    operation: &'a str,
    #[serde(skip_serializing_if = "no_metadata")]
    metadata: &'a HashMap<String, String>,
}

fn no_metadata(metadata: &&HashMap<String, String>) -> bool {
    metadata.is_empty()
}

/// Sidecar-backed transport.
///
/// Bindings are invoked with `POST {sidecar}/v1.0/bindings/{component}`,
/// pub/sub components with `POST {sidecar}/v1.0/publish/{component}/{topic}`.
/// The sidecar's response body is returned from `send`.
#[derive(Debug, Clone)]
pub struct DaprTransport {
    client: Client,
    base: Url,
}

impl DaprTransport {
    /// Create a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .user_agent(concat!("func-runtime/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::invalid_value("transport", e.to_string()))?;

        Self::with_client(client, &config.sidecar_url)
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client, sidecar_url: &str) -> Result<Self, ConfigError> {
        let mut base = Url::parse(sidecar_url)
            .map_err(|e| ConfigError::invalid_value("transport.sidecar_url", e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::invalid_value(
                "transport.sidecar_url",
                "must be an absolute http(s) URL",
            ));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, target: &str, path: &str) -> Result<Url, TransportError> {
        self.base.join(path).map_err(|e| TransportError::Request {
            target: target.to_string(),
            reason: e.to_string(),
        })
    }

    fn binding_request(
        &self,
        output: &str,
        component: &ComponentSpec,
        data: Bytes,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = self.endpoint(output, &format!("v1.0/bindings/{}", component.component_name))?;
        let body = BindingRequest {
            data: json_or_string(&data),
            operation: component.operation.as_deref().unwrap_or(DEFAULT_OPERATION),
            metadata: &component.metadata,
        };
        Ok(self.client.post(url).json(&body))
    }

    fn publish_request(
        &self,
        output: &str,
        component: &ComponentSpec,
        data: Bytes,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = self.endpoint(
            output,
            &format!("v1.0/publish/{}/{}", component.component_name, component.topic()),
        )?;
        let content_type = if serde_json::from_slice::<serde_json::Value>(&data).is_ok() {
            "application/json"
        } else {
            "application/octet-stream"
        };

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data);
        for (key, value) in &component.metadata {
            request = request.query(&[(format!("metadata.{key}"), value)]);
        }
        Ok(request)
    }
}

#[async_trait]
impl OutputTransport for DaprTransport {
    fn name(&self) -> &str {
        "dapr"
    }

    async fn send(
        &self,
        output: &str,
        component: &ComponentSpec,
        data: Bytes,
    ) -> Result<Bytes, TransportError> {
        let request = match component.kind() {
            ComponentKind::PubSub => self.publish_request(output, component, data)?,
            ComponentKind::Binding | ComponentKind::Other => {
                self.binding_request(output, component, data)?
            }
        };

        let response = request.send().await.map_err(|e| {
            warn!(output, component = %component.component_name, error = %e, "Sidecar request failed");
            TransportError::Request {
                target: output.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(output, status = status.as_u16(), "Sidecar rejected send");
            return Err(TransportError::Status {
                target: output.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| TransportError::Request {
            target: output.to_string(),
            reason: e.to_string(),
        })?;

        debug!(output, status = status.as_u16(), size = body.len(), "Sidecar send completed");
        Ok(body)
    }
}

/// Binding payloads are embedded as JSON when they parse, otherwise as a string.
fn json_or_string(data: &[u8]) -> serde_json::Value {
    serde_json::from_slice(data)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(data).into_owned()))
}

/// Create an in-process broker with the given queue capacity.
pub fn channel_broker(capacity: usize) -> (ChannelTransport, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    let transport = ChannelTransport {
        tx,
        delivered: Arc::new(Mutex::new(HashMap::new())),
    };
    (transport, ChannelSource { rx })
}

/// Sending half of the in-process broker.
///
/// A send to an output enqueues a [`BindingMessage`] whose `input` is the
/// output's component name and replies with an empty body.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<BindingMessage>,
    delivered: Arc<Mutex<HashMap<String, u64>>>,
}

impl ChannelTransport {
    /// Enqueue a message directly, bypassing output resolution.
    pub async fn publish(&self, message: BindingMessage) -> Result<(), TransportError> {
        let component = message.input.clone();
        self.tx.send(message).await.map_err(|_| TransportError::Closed)?;
        *self.delivered.lock().entry(component).or_default() += 1;
        Ok(())
    }

    /// Messages enqueued for a component so far.
    pub fn delivered(&self, component: &str) -> u64 {
        self.delivered.lock().get(component).copied().unwrap_or(0)
    }
}

#[async_trait]
impl OutputTransport for ChannelTransport {
    fn name(&self) -> &str {
        "channel"
    }

    async fn send(
        &self,
        output: &str,
        component: &ComponentSpec,
        data: Bytes,
    ) -> Result<Bytes, TransportError> {
        let mut message = BindingMessage::new(component.component_name.clone(), data);
        for (key, value) in &component.metadata {
            message = message.with_metadata(key.clone(), value.clone());
        }

        debug!(output, component = %component.component_name, "Enqueueing message");
        self.publish(message).await?;
        Ok(Bytes::new())
    }
}

/// Receiving half of the in-process broker.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<BindingMessage>,
}

impl ChannelSource {
    /// Wait for the next message. Returns `None` once every transport handle
    /// has been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<BindingMessage> {
        self.rx.recv().await
    }
}
