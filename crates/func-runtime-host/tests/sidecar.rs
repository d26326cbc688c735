//! Integration tests for the sidecar transport against a mock sidecar.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use parking_lot::Mutex;
use std::collections::HashMap;

use func_runtime_common::{ComponentSpec, TransportConfig, TransportError};
use func_runtime_core::OutputTransport;
use func_runtime_host::DaprTransport;

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    content_type: Option<String>,
    query: HashMap<String, String>,
    body: Bytes,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

async fn binding(
    State(log): State<Log>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if name == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "");
    }
    log.lock().push(Recorded {
        path: format!("/v1.0/bindings/{name}"),
        content_type: content_type(&headers),
        query: HashMap::new(),
        body,
    });
    (StatusCode::OK, r#"{"ok":true}"#)
}

async fn publish(
    State(log): State<Log>,
    Path((pubsub, topic)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    log.lock().push(Recorded {
        path: format!("/v1.0/publish/{pubsub}/{topic}"),
        content_type: content_type(&headers),
        query,
        body,
    });
    StatusCode::NO_CONTENT
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

async fn start_sidecar() -> (String, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1.0/bindings/:name", post(binding))
        .route("/v1.0/publish/:pubsub/:topic", post(publish))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), log)
}

fn transport(url: String) -> DaprTransport {
    DaprTransport::new(&TransportConfig {
        sidecar_url: url,
        timeout_ms: 2000,
    })
    .unwrap()
}

#[tokio::test]
async fn test_binding_send() {
    let (url, log) = start_sidecar().await;
    let transport = transport(url);

    let component = ComponentSpec::new("kafka-out", "bindings.kafka").with_operation("create");
    let reply = transport
        .send("target", &component, Bytes::from_static(br#"{"hello":"world"}"#))
        .await
        .unwrap();

    assert_eq!(reply, Bytes::from_static(br#"{"ok":true}"#));

    let recorded = log.lock()[0].clone();
    assert_eq!(recorded.path, "/v1.0/bindings/kafka-out");
    assert_eq!(recorded.content_type.as_deref(), Some("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&recorded.body).unwrap();
    assert_eq!(body["data"], serde_json::json!({"hello": "world"}));
    assert_eq!(body["operation"], "create");
}

#[tokio::test]
async fn test_publish_send() {
    let (url, log) = start_sidecar().await;
    let transport = transport(url);

    let mut component = ComponentSpec::new("msg", "pubsub.natsstreaming").with_uri("orders");
    component.metadata.insert("ttlInSeconds".into(), "60".into());

    let reply = transport
        .send("publisher", &component, Bytes::from_static(b"raw bytes"))
        .await
        .unwrap();
    assert!(reply.is_empty());

    let recorded = log.lock()[0].clone();
    assert_eq!(recorded.path, "/v1.0/publish/msg/orders");
    assert_eq!(recorded.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(recorded.query.get("metadata.ttlInSeconds").map(String::as_str), Some("60"));
    assert_eq!(recorded.body, Bytes::from_static(b"raw bytes"));
}

#[tokio::test]
async fn test_rejected_send() {
    let (url, _log) = start_sidecar().await;
    let transport = transport(url);

    let component = ComponentSpec::new("broken", "bindings.http");
    let err = transport
        .send("target", &component, Bytes::from_static(b"x"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::Status {
            target: "target".into(),
            status: 500
        }
    );
}

#[tokio::test]
async fn test_unreachable_sidecar() {
    let transport = transport("http://127.0.0.1:1".to_string());
    let component = ComponentSpec::new("kafka-out", "bindings.kafka");

    let err = transport
        .send("target", &component, Bytes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Request { .. }));
}
