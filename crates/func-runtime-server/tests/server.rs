//! End-to-end tests against a running server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use func_runtime_common::{
    ComponentSpec, DispatchError, FrameworkError, FunctionError, HookError, HookStage,
    InvocationError, RegistrationError, RuntimeContext, RuntimeKind, TransportError,
};
use func_runtime_core::{
    BindingMessage, CloudEvent, CloudEventFunction, FunctionEntry, HttpFunction, HttpRequest,
    InvocationContext, OpenFunction, Out, OutputTransport, PathVars, Plugin, ResponseWriter,
};
use func_runtime_host::channel_broker;
use func_runtime_server::{FUNCTION_STATUS_HEADER, Framework};

struct Hello;

#[async_trait]
impl HttpFunction for Hello {
    async fn call(&self, w: &mut ResponseWriter, _req: &HttpRequest) {
        w.write(b"hello");
    }
}

struct Panicking;

#[async_trait]
impl HttpFunction for Panicking {
    async fn call(&self, _w: &mut ResponseWriter, _req: &HttpRequest) {
        panic!("handler exploded");
    }
}

struct ItemId;

#[async_trait]
impl HttpFunction for ItemId {
    async fn call(&self, w: &mut ResponseWriter, req: &HttpRequest) {
        let id = req
            .extensions()
            .get::<PathVars>()
            .and_then(|vars| vars.get("id"))
            .unwrap_or("none")
            .to_string();
        w.write(id.as_bytes());
    }
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl HttpFunction for Counting {
    async fn call(&self, w: &mut ResponseWriter, _req: &HttpRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        w.write(b"counted");
    }
}

struct CountingEvents {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CloudEventFunction for CountingEvents {
    async fn call(&self, _ctx: &InvocationContext, _event: &CloudEvent) -> Result<(), FunctionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Deny;

#[async_trait]
impl Plugin for Deny {
    fn name(&self) -> &str {
        "deny"
    }

    async fn exec_pre_hook(&self, _ctx: &mut InvocationContext) -> Result<(), HookError> {
        Err(HookError::new("deny", HookStage::Pre, "not allowed"))
    }

    async fn exec_post_hook(&self, _ctx: &mut InvocationContext) -> Result<(), HookError> {
        Ok(())
    }
}

struct Observe {
    saw_hook_error: Arc<AtomicBool>,
}

#[async_trait]
impl Plugin for Observe {
    fn name(&self) -> &str {
        "observe"
    }

    async fn exec_pre_hook(&self, _ctx: &mut InvocationContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn exec_post_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError> {
        let is_hook = ctx.error().is_some_and(InvocationError::is_hook);
        self.saw_hook_error.store(is_hook, Ordering::SeqCst);
        Ok(())
    }
}

fn http_entry(name: &str, path: &str, f: impl HttpFunction + 'static) -> FunctionEntry {
    FunctionEntry::builder(name).path(path).http(f).build().unwrap()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let mut framework = Framework::new(RuntimeContext::default());
    framework.register(http_entry("hello", "/hello", Hello)).unwrap();
    let server = framework.start_test(None).await.unwrap();

    let resp = reqwest::get(format!("{}/healthz", server.url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");

    let resp = reqwest::get(format!("{}/readyz", server.url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["functions"], serde_json::json!(["hello"]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first() {
    let mut framework = Framework::new(RuntimeContext::default());
    framework.register(http_entry("hello", "/first", Hello)).unwrap();

    let err = framework
        .register(http_entry("hello", "/second", Hello))
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::DuplicateName {
            name: "hello".into()
        }
    );

    let entry = framework.registry().lookup("hello").unwrap();
    assert_eq!(entry.path(), Some("/first"));
}

#[tokio::test]
async fn test_async_runtime_with_two_functions_fails_before_serving() {
    struct Noop;

    #[async_trait]
    impl OpenFunction for Noop {
        async fn call(&self, ctx: &InvocationContext, _input: Bytes) -> Result<Out, FunctionError> {
            Ok(ctx.return_on_success())
        }
    }

    let mut framework =
        Framework::new(RuntimeContext::default().with_runtime(RuntimeKind::AsyncServing));
    for name in ["one", "two"] {
        framework
            .register(FunctionEntry::builder(name).open_function(Noop).build().unwrap())
            .unwrap();
    }

    let err = framework.start_test(None).await.err().unwrap();
    assert!(matches!(
        err,
        FrameworkError::Dispatch(DispatchError::TooManyFunctions { count: 2 })
    ));
}

#[tokio::test]
async fn test_pre_hook_error_skips_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let saw_hook_error = Arc::new(AtomicBool::new(false));

    let runtime = RuntimeContext::default()
        .with_plugins(vec!["deny".into()], vec!["observe".into()]);
    let mut framework = Framework::new(runtime);
    framework.register_plugins([
        Arc::new(Deny) as Arc<dyn Plugin>,
        Arc::new(Observe {
            saw_hook_error: saw_hook_error.clone(),
        }),
    ]);
    framework
        .register(http_entry("guarded", "/guarded", Counting { calls: calls.clone() }))
        .unwrap();
    let server = framework.start_test(None).await.unwrap();

    let resp = reqwest::get(format!("{}/guarded", server.url())).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.headers()[FUNCTION_STATUS_HEADER], "error");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(saw_hook_error.load(Ordering::SeqCst));

    server.shutdown().await;
}

#[tokio::test]
async fn test_crash_is_isolated() {
    let mut framework = Framework::new(RuntimeContext::default());
    framework.register(http_entry("boom", "/boom", Panicking)).unwrap();
    framework.register(http_entry("hello", "/hello", Hello)).unwrap();
    let server = framework.start_test(None).await.unwrap();

    let resp = reqwest::get(format!("{}/boom", server.url())).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.headers()[FUNCTION_STATUS_HEADER], "crash");
    assert!(resp.text().await.unwrap().contains("handler exploded"));

    let resp = reqwest::get(format!("{}/hello", server.url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[FUNCTION_STATUS_HEADER], "success");
    assert_eq!(resp.text().await.unwrap(), "hello");

    server.shutdown().await;
}

#[tokio::test]
async fn test_path_variables() {
    let mut framework = Framework::new(RuntimeContext::default());
    framework.register(http_entry("item", "/items/{id}", ItemId)).unwrap();
    let server = framework.start_test(None).await.unwrap();

    let resp = reqwest::get(format!("{}/items/42", server.url())).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "42");

    server.shutdown().await;
}

#[tokio::test]
async fn test_method_filter() {
    let mut framework = Framework::new(RuntimeContext::default());
    framework
        .register(
            FunctionEntry::builder("create")
                .path("/items")
                .method(axum::http::Method::POST)
                .http(Hello)
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(None).await.unwrap();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/items", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/items", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);

    server.shutdown().await;
}

#[tokio::test]
async fn test_explicit_target_binds_only_that_function() {
    let http_calls = Arc::new(AtomicUsize::new(0));
    let event_calls = Arc::new(AtomicUsize::new(0));

    let mut framework = Framework::new(RuntimeContext::default());
    framework
        .register(http_entry("a", "/a", Counting { calls: http_calls.clone() }))
        .unwrap();
    framework
        .register(
            FunctionEntry::builder("b")
                .path("/b")
                .cloud_event(CountingEvents {
                    calls: event_calls.clone(),
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(Some("a")).await.unwrap();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/b", server.url()))
        .header("ce-specversion", "1.0")
        .header("ce-id", "1")
        .header("ce-source", "/test")
        .header("ce-type", "test.event")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(event_calls.load(Ordering::SeqCst), 0);

    let resp = client.get(format!("{}/a", server.url())).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(http_calls.load(Ordering::SeqCst), 1);

    let readyz: serde_json::Value = serde_json::from_str(
        &client
            .get(format!("{}/readyz", server.url()))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(readyz["functions"], serde_json::json!(["a"]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_cloud_event_delivery() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut framework = Framework::new(RuntimeContext::default());
    framework
        .register(
            FunctionEntry::builder("events")
                .path("/events")
                .cloud_event(CountingEvents {
                    calls: calls.clone(),
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(None).await.unwrap();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/events", server.url()))
        .header("content-type", "application/cloudevents+json")
        .body(
            serde_json::json!({
                "specversion": "1.0",
                "id": "abc",
                "source": "/orders",
                "type": "order.created",
                "datacontenttype": "application/json",
                "data": {"id": 7}
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let resp = client
        .post(format!("{}/events", server.url()))
        .body("not an event")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.shutdown().await;
}

struct TenantEvents {
    tx: mpsc::UnboundedSender<Option<String>>,
}

#[async_trait]
impl CloudEventFunction for TenantEvents {
    async fn call(&self, ctx: &InvocationContext, _event: &CloudEvent) -> Result<(), FunctionError> {
        let _ = self.tx.send(ctx.var("tenant").map(str::to_string));
        Ok(())
    }
}

#[tokio::test]
async fn test_cloud_event_sees_path_variables() {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut framework = Framework::new(RuntimeContext::default());
    framework
        .register(
            FunctionEntry::builder("tenant-events")
                .path("/events/{tenant}")
                .cloud_event(TenantEvents { tx })
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(None).await.unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/events/acme", server.url()))
        .header("ce-specversion", "1.0")
        .header("ce-id", "1")
        .header("ce-source", "/test")
        .header("ce-type", "test.event")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(rx.recv().await.unwrap().as_deref(), Some("acme"));

    server.shutdown().await;
}

struct EchoTransport;

#[async_trait]
impl OutputTransport for EchoTransport {
    fn name(&self) -> &str {
        "echo"
    }

    async fn send(
        &self,
        _output: &str,
        _component: &ComponentSpec,
        data: Bytes,
    ) -> Result<Bytes, TransportError> {
        Ok(data)
    }
}

struct Relay;

#[async_trait]
impl OpenFunction for Relay {
    async fn call(&self, ctx: &InvocationContext, input: Bytes) -> Result<Out, FunctionError> {
        let reply = ctx.send("sink", input).await?;
        Ok(ctx.return_on_success().with_data(reply))
    }
}

#[tokio::test]
async fn test_send_through_transport() {
    let runtime = RuntimeContext::default()
        .with_output("sink", ComponentSpec::new("sink-binding", "bindings.kafka"));
    let mut framework = Framework::new(runtime).with_transport(Arc::new(EchoTransport));
    framework
        .register(
            FunctionEntry::builder("relay")
                .path("/relay")
                .open_function(Relay)
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(None).await.unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/relay", server.url()))
        .body("ping")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[FUNCTION_STATUS_HEADER], "success");
    assert_eq!(resp.text().await.unwrap(), "ping");

    server.shutdown().await;
}

struct Forward {
    tx: mpsc::UnboundedSender<(String, Bytes)>,
}

#[async_trait]
impl OpenFunction for Forward {
    async fn call(&self, ctx: &InvocationContext, input: Bytes) -> Result<Out, FunctionError> {
        let origin = ctx
            .message()
            .and_then(|m| m.metadata.get("topic").cloned())
            .unwrap_or_else(|| "direct".to_string());
        let _ = self.tx.send((origin, input));
        Ok(ctx.return_on_success())
    }
}

#[tokio::test]
async fn test_async_runtime_over_http() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runtime = RuntimeContext::default()
        .with_runtime(RuntimeKind::AsyncServing)
        .with_input(
            "orders",
            ComponentSpec::new("msg", "pubsub.natsstreaming").with_uri("orders"),
        );
    let mut framework = Framework::new(runtime);
    framework
        .register(
            FunctionEntry::builder("subscriber")
                .open_function(Forward { tx })
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(None).await.unwrap();
    let client = reqwest::Client::new();

    let subscriptions: serde_json::Value = serde_json::from_str(
        &client
            .get(format!("{}/dapr/subscribe", server.url()))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(
        subscriptions,
        serde_json::json!([{"pubsubname": "msg", "topic": "orders", "route": "/msg/orders"}])
    );

    let resp = client
        .post(format!("{}/msg/orders", server.url()))
        .header("content-type", "application/cloudevents+json")
        .body(
            serde_json::json!({
                "specversion": "1.0",
                "id": "evt-1",
                "source": "msg",
                "type": "com.dapr.event.sent",
                "topic": "orders",
                "datacontenttype": "text/plain",
                "data": "order-1"
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[FUNCTION_STATUS_HEADER], "success");

    let (origin, data) = rx.recv().await.unwrap();
    assert_eq!(origin, "orders");
    assert_eq!(data, Bytes::from_static(b"order-1"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_async_runtime_consumes_channel() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (transport, source) = channel_broker(16);

    let mut framework =
        Framework::new(RuntimeContext::default().with_runtime(RuntimeKind::AsyncServing))
            .with_channel_source(source);
    framework
        .register(
            FunctionEntry::builder("consumer")
                .open_function(Forward { tx })
                .build()
                .unwrap(),
        )
        .unwrap();
    let server = framework.start_test(None).await.unwrap();

    transport
        .publish(BindingMessage::new("cron", "tick").with_metadata("topic", "timer"))
        .await
        .unwrap();

    let (origin, data) = rx.recv().await.unwrap();
    assert_eq!(origin, "timer");
    assert_eq!(data, Bytes::from_static(b"tick"));

    server.shutdown().await;
}
