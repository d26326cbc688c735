//! Event payloads delivered to functions.
//!
//! - [`CloudEvent`]: A decoded CloudEvents v1.0 event
//! - [`BindingMessage`]: A message consumed from an input binding or topic
//! - [`EventPayload`]: Either of the above, as stored on an invocation

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

/// The CloudEvents spec version produced and accepted by the runtime.
pub const SPEC_VERSION: &str = "1.0";

/// A CloudEvents v1.0 event.
///
/// Wire encoding lives in the server crate; this is the decoded value handed
/// to CloudEvent functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEvent {
    /// Event identifier, unique per source.
    pub id: String,
    /// Context in which the event happened.
    pub source: String,
    /// Event type, e.g. `com.example.object.created`.
    pub event_type: String,
    /// CloudEvents spec version.
    pub spec_version: String,
    /// Content type of `data`.
    pub data_content_type: Option<String>,
    /// Schema that `data` adheres to.
    pub data_schema: Option<String>,
    /// Subject of the event within the source.
    pub subject: Option<String>,
    /// Timestamp as sent by the producer (RFC 3339).
    pub time: Option<String>,
    /// Extension attributes.
    pub extensions: BTreeMap<String, String>,
    /// Event payload.
    pub data: Option<Bytes>,
}

impl CloudEvent {
    /// Create an event with the required attributes.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            spec_version: SPEC_VERSION.to_string(),
            data_content_type: None,
            data_schema: None,
            subject: None,
            time: None,
            extensions: BTreeMap::new(),
            data: None,
        }
    }

    /// Attach a payload with its content type.
    pub fn with_data(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.data_content_type = Some(content_type.into());
        self.data = Some(data.into());
        self
    }

    /// Set the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set an extension attribute.
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// Get an extension attribute.
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    /// The payload bytes, empty when absent.
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }

    /// Returns `true` if the payload is declared as JSON.
    pub fn is_json(&self) -> bool {
        self.data_content_type
            .as_deref()
            .is_none_or(|ct| ct.contains("json"))
    }
}

/// A message consumed from an input binding or pub/sub topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingMessage {
    /// Name of the input the message arrived on.
    pub input: String,
    /// Message body.
    pub data: Bytes,
    /// Transport metadata (headers, topic, partition, ...).
    pub metadata: HashMap<String, String>,
}

impl BindingMessage {
    /// Create a message for the given input.
    pub fn new(input: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            input: input.into(),
            data: data.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The event carried by a CloudEvent or async binding invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A decoded CloudEvent.
    Cloud(CloudEvent),
    /// A consumed binding message.
    Message(BindingMessage),
}

impl EventPayload {
    /// The payload bytes.
    pub fn data(&self) -> Bytes {
        match self {
            EventPayload::Cloud(event) => event.data_bytes(),
            EventPayload::Message(message) => message.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_event_builder() {
        let event = CloudEvent::new("1", "/orders", "order.created")
            .with_data("application/json", r#"{"id": 7}"#)
            .with_subject("7")
            .with_extension("traceparent", "00-abc-def-01");

        assert_eq!(event.spec_version, SPEC_VERSION);
        assert_eq!(event.subject.as_deref(), Some("7"));
        assert_eq!(event.extension("traceparent"), Some("00-abc-def-01"));
        assert_eq!(event.data_bytes(), Bytes::from_static(br#"{"id": 7}"#));
        assert!(event.is_json());
    }

    #[test]
    fn test_event_without_data() {
        let event = CloudEvent::new("1", "/s", "t");
        assert!(event.data_bytes().is_empty());
        assert!(event.is_json());

        let event = event.with_data("text/plain", "hi");
        assert!(!event.is_json());
    }

    #[test]
    fn test_payload_data() {
        let message = BindingMessage::new("cron", "tick").with_metadata("partition", "0");
        let payload = EventPayload::Message(message);
        assert_eq!(payload.data(), Bytes::from_static(b"tick"));

        let payload = EventPayload::Cloud(CloudEvent::new("1", "/s", "t"));
        assert!(payload.data().is_empty());
    }
}
