//! Sample functions shipped with the binary.

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use tracing::info;

use func_runtime_common::{FunctionError, RegistrationError, RuntimeKind};
use func_runtime_core::{
    CloudEvent, CloudEventFunction, FunctionEntry, HttpFunction, HttpRequest, InvocationContext,
    OpenFunction, Out, PathVars, ResponseWriter,
};
use func_runtime_server::Framework;

/// `GET /hello/{name}`: plain HTTP greeting.
struct Hello;

#[async_trait]
impl HttpFunction for Hello {
    async fn call(&self, w: &mut ResponseWriter, req: &HttpRequest) {
        let name = req
            .extensions()
            .get::<PathVars>()
            .and_then(|vars| vars.get("name"))
            .unwrap_or("world")
            .to_string();

        w.set_header("content-type", "text/plain; charset=utf-8");
        w.write(format!("Hello, {name}!\n").as_bytes());
    }
}

/// `/echo`: returns its input wrapped in JSON.
struct Echo;

#[async_trait]
impl OpenFunction for Echo {
    async fn call(&self, ctx: &InvocationContext, input: Bytes) -> Result<Out, FunctionError> {
        let body = serde_json::json!({
            "function": ctx.function_name(),
            "request_id": ctx.request_id(),
            "echo": String::from_utf8_lossy(&input),
        });

        Ok(ctx
            .return_on_success()
            .with_header("content-type", "application/json")
            .with_data(body.to_string()))
    }
}

/// Forwards every input to all declared outputs.
struct Sender;

#[async_trait]
impl OpenFunction for Sender {
    async fn call(&self, ctx: &InvocationContext, input: Bytes) -> Result<Out, FunctionError> {
        let outputs: Vec<String> = ctx.runtime().outputs().keys().cloned().collect();
        for output in &outputs {
            let reply = ctx.send(output, input.clone()).await?;
            info!(output = %output, reply_size = reply.len(), "Forwarded input");
        }

        Ok(ctx.return_on_success().with_data(input))
    }
}

/// `/events`: logs every CloudEvent it receives.
struct EventLogger;

#[async_trait]
impl CloudEventFunction for EventLogger {
    async fn call(&self, ctx: &InvocationContext, event: &CloudEvent) -> Result<(), FunctionError> {
        info!(
            request_id = ctx.request_id(),
            id = %event.id,
            source = %event.source,
            event_type = %event.event_type,
            size = event.data_bytes().len(),
            "Received CloudEvent"
        );
        Ok(())
    }
}

/// Register the samples that suit the framework's runtime.
///
/// The async runtime serves a single function, so only `sender` is
/// registered there.
pub fn register_all(framework: &mut Framework) -> Result<(), RegistrationError> {
    match framework.runtime().runtime() {
        RuntimeKind::HttpServing => {
            framework.register(
                FunctionEntry::builder("hello")
                    .path("/hello/{name}")
                    .method(Method::GET)
                    .http(Hello)
                    .build()?,
            )?;
            framework.register(FunctionEntry::builder("echo").path("/echo").open_function(Echo).build()?)?;
            framework.register(
                FunctionEntry::builder("events")
                    .path("/events")
                    .cloud_event(EventLogger)
                    .build()?,
            )?;
        }
        RuntimeKind::AsyncServing => {
            framework.register(FunctionEntry::builder("sender").open_function(Sender).build()?)?;
        }
    }

    Ok(())
}
