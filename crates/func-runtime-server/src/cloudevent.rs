//! CloudEvents HTTP protocol binding.
//!
//! Supports both content modes of the CloudEvents v1.0 HTTP binding:
//!
//! - **Binary**: attributes in `ce-*` headers, payload as the body
//! - **Structured**: the whole event as `application/cloudevents+json`
//!
//! Batch mode and `data_base64` payloads are rejected.

use axum::http::HeaderMap;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

use func_runtime_core::CloudEvent;
use func_runtime_core::event::SPEC_VERSION;

use crate::request::content_type;

/// Media type of structured-mode events.
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

const BATCH_CONTENT_TYPE: &str = "application/cloudevents-batch+json";
const HEADER_PREFIX: &str = "ce-";

/// Why an HTTP request could not be decoded as a CloudEvent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("Unsupported specversion '{0}'")]
    UnsupportedVersion(String),

    #[error("Attribute '{name}' is not valid: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Malformed structured event: {0}")]
    Malformed(String),

    #[error("Unsupported CloudEvents encoding: {0}")]
    Unsupported(&'static str),
}

fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// Decode an event from an HTTP request's headers and body.
pub fn decode(headers: &HeaderMap, body: Bytes) -> Result<CloudEvent, DecodeError> {
    match content_type(headers).map(essence) {
        Some(STRUCTURED_CONTENT_TYPE) => decode_structured(&body),
        Some(BATCH_CONTENT_TYPE) => Err(DecodeError::Unsupported("batch mode")),
        _ => decode_binary(headers, body),
    }
}

fn decode_binary(headers: &HeaderMap, body: Bytes) -> Result<CloudEvent, DecodeError> {
    let header = |name: &'static str| -> Result<Option<String>, DecodeError> {
        headers
            .get(format!("{HEADER_PREFIX}{name}"))
            .map(|v| {
                v.to_str()
                    .map(ToString::to_string)
                    .map_err(|e| DecodeError::InvalidAttribute {
                        name: name.to_string(),
                        reason: e.to_string(),
                    })
            })
            .transpose()
    };
    let required = |name: &'static str| header(name)?.ok_or(DecodeError::MissingAttribute(name));

    let spec_version = required("specversion")?;
    if spec_version != SPEC_VERSION {
        return Err(DecodeError::UnsupportedVersion(spec_version));
    }

    let mut event = CloudEvent::new(required("id")?, required("source")?, required("type")?);
    event.subject = header("subject")?;
    event.time = header("time")?;
    event.data_schema = header("dataschema")?;

    for (name, value) in headers {
        let Some(ext) = name.as_str().strip_prefix(HEADER_PREFIX) else {
            continue;
        };
        if matches!(
            ext,
            "specversion" | "id" | "source" | "type" | "subject" | "time" | "dataschema"
        ) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            event.extensions.insert(ext.to_string(), value.to_string());
        }
    }

    event.data_content_type = content_type(headers).map(ToString::to_string);
    if !body.is_empty() {
        event.data = Some(body);
    }

    Ok(event)
}

fn decode_structured(body: &[u8]) -> Result<CloudEvent, DecodeError> {
    let mut object: Map<String, Value> = match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err(DecodeError::Malformed("expected a JSON object".into())),
        Err(e) => return Err(DecodeError::Malformed(e.to_string())),
    };

    if object.contains_key("data_base64") {
        return Err(DecodeError::Unsupported("data_base64"));
    }

    let mut take = |name: &'static str| -> Result<Option<String>, DecodeError> {
        match object.remove(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(DecodeError::InvalidAttribute {
                name: name.to_string(),
                reason: format!("expected a string, got {other}"),
            }),
        }
    };

    let spec_version = take("specversion")?.ok_or(DecodeError::MissingAttribute("specversion"))?;
    if spec_version != SPEC_VERSION {
        return Err(DecodeError::UnsupportedVersion(spec_version));
    }

    let id = take("id")?.ok_or(DecodeError::MissingAttribute("id"))?;
    let source = take("source")?.ok_or(DecodeError::MissingAttribute("source"))?;
    let event_type = take("type")?.ok_or(DecodeError::MissingAttribute("type"))?;

    let mut event = CloudEvent::new(id, source, event_type);
    event.subject = take("subject")?;
    event.time = take("time")?;
    event.data_schema = take("dataschema")?;
    event.data_content_type = take("datacontenttype")?;

    if let Some(data) = object.remove("data") {
        let json_payload = event.is_json();
        event.data = Some(match data {
            Value::String(s) if !json_payload => Bytes::from(s),
            other => Bytes::from(other.to_string()),
        });
        if event.data_content_type.is_none() {
            event.data_content_type = Some("application/json".to_string());
        }
    }

    for (name, value) in object {
        let value = match value {
            Value::String(s) => s,
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            _ => continue,
        };
        event.extensions.insert(name, value);
    }

    Ok(event)
}
