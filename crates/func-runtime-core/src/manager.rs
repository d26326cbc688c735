//! Invocation pipeline.
//!
//! [`RuntimeManager`] creates a fresh [`InvocationContext`] per trigger and
//! runs pre-hooks, the handler and post-hooks against it:
//!
//! 1. Pre-hooks in order; the first error skips the rest and the handler
//! 2. The handler, under the panic guard
//! 3. Post-hooks in order, always
//!
//! Whatever `result` and `error` the context holds afterwards is what the
//! trigger adapter serializes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use func_runtime_common::{CrashError, FunctionError, InvocationError, RuntimeContext};

use crate::context::{InvocationContext, Out};
use crate::function::{FunctionEntry, Handler};
use crate::guard::catch_panic;
use crate::plugin::PluginPipeline;
use crate::transport::OutputTransport;

/// Binds the runtime context and plugin pipeline to each invocation.
///
/// Cheap to clone; every adapter holds one.
#[derive(Clone)]
pub struct RuntimeManager {
    runtime: Arc<RuntimeContext>,
    pipeline: Arc<PluginPipeline>,
    transport: Option<Arc<dyn OutputTransport>>,
    shutdown: CancellationToken,
}

impl RuntimeManager {
    pub fn new(runtime: Arc<RuntimeContext>, pipeline: Arc<PluginPipeline>) -> Self {
        Self {
            runtime,
            pipeline,
            transport: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the output transport bound to invocations when outputs are declared.
    pub fn with_transport(mut self, transport: Arc<dyn OutputTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the serving-wide shutdown token. Each invocation gets a child of it.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }

    pub fn pipeline(&self) -> &PluginPipeline {
        &self.pipeline
    }

    pub fn transport(&self) -> Option<&Arc<dyn OutputTransport>> {
        self.transport.as_ref()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Allocate a fresh context for one invocation of `entry`.
    pub fn new_invocation(&self, entry: &FunctionEntry) -> InvocationContext {
        let mut ctx = InvocationContext::new(entry.name(), entry.trigger_kind(), self.runtime.clone())
            .with_cancellation(self.shutdown.child_token());

        if self.runtime.has_outputs() {
            if let Some(transport) = &self.transport {
                ctx = ctx.with_transport(transport.clone());
            }
        }

        ctx
    }

    /// Run the pipeline for `handler` against `ctx`.
    pub async fn run_with_hooks(&self, ctx: &mut InvocationContext, handler: &Handler) {
        let span = info_span!(
            "invocation",
            request_id = %ctx.request_id(),
            function = %ctx.function_name(),
            trigger = %ctx.trigger(),
        );

        self.run_stages(ctx, handler).instrument(span).await
    }

    async fn run_stages(&self, ctx: &mut InvocationContext, handler: &Handler) {
        match catch_panic(self.pipeline.run_pre(ctx)).await {
            Ok(Ok(())) => match catch_panic(invoke(ctx, handler)).await {
                Ok(()) => {}
                Err(crash) => record_crash(ctx, crash),
            },
            Ok(Err(hook_error)) => {
                warn!(error = %hook_error, "Pre-hook failed, skipping handler");
                ctx.record_error(hook_error.into());
            }
            Err(crash) => record_crash(ctx, crash),
        }

        if let Err(crash) = catch_panic(self.pipeline.run_post(ctx)).await {
            record_crash(ctx, crash);
        }

        let duration_ms = ctx.elapsed().as_millis() as u64;
        match ctx.error() {
            None => info!(
                code = ctx.result().code(),
                duration_ms,
                "Invocation completed"
            ),
            Some(e) => info!(
                code = ctx.result().code(),
                duration_ms,
                error = %e,
                "Invocation completed with error"
            ),
        }
    }
}

impl std::fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("runtime", &self.runtime.runtime())
            .field("pipeline", &self.pipeline)
            .field("transport", &self.transport.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

async fn invoke(ctx: &mut InvocationContext, handler: &Handler) {
    debug!("Invoking handler");

    let outcome = match handler {
        Handler::Http(f) => {
            if let Some((request, writer)) = ctx.http_parts() {
                f.call(writer, request).await;
                let out = ctx.take_writer().into_out();
                ctx.set_result(out);
                Ok(())
            } else {
                Err(FunctionError::failed("no HTTP request attached"))
            }
        }
        Handler::CloudEvent(f) => {
            let shared: &InvocationContext = ctx;
            let outcome = match shared.cloud_event() {
                Some(event) => f.call(shared, event).await,
                None => Err(FunctionError::failed("no CloudEvent attached")),
            };
            if outcome.is_ok() {
                ctx.set_result(Out::success());
            }
            outcome
        }
        Handler::AsyncBinding(f) => {
            let input = ctx.input();
            let returned = f.call(ctx, input).await;
            returned.map(|out| ctx.set_result(out))
        }
    };

    if let Err(e) = outcome {
        warn!(error = %e, "Handler returned an error");
        if ctx.result().is_unset() {
            ctx.set_result(Out::internal_error());
        }
        ctx.record_error(InvocationError::Handler(e));
    }
}

fn record_crash(ctx: &mut InvocationContext, crash: CrashError) {
    error!(
        message = %crash.message,
        location = crash.location.as_deref().unwrap_or("<unknown>"),
        stack = crash.stack.as_deref().unwrap_or("<unavailable>"),
        "Function panicked"
    );
    ctx.set_error(Some(InvocationError::Crash(crash)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HttpRequest, ResponseWriter, StatusKind};
    use crate::event::CloudEvent;
    use crate::function::{CloudEventFunction, HttpFunction, OpenFunction};
    use async_trait::async_trait;
    use bytes::Bytes;
    use func_runtime_common::{ComponentSpec, TransportError};
    use http::StatusCode;

    struct Created;

    #[async_trait]
    impl HttpFunction for Created {
        async fn call(&self, w: &mut ResponseWriter, req: &HttpRequest) {
            w.write_header(StatusCode::CREATED);
            w.write(req.body());
        }
    }

    struct Failing;

    #[async_trait]
    impl OpenFunction for Failing {
        async fn call(&self, _ctx: &InvocationContext, _input: Bytes) -> Result<Out, FunctionError> {
            Err(FunctionError::failed("bad input"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl OpenFunction for Panicking {
        async fn call(&self, _ctx: &InvocationContext, input: Bytes) -> Result<Out, FunctionError> {
            let index = input.len() + 10;
            let values = [1, 2, 3];
            Ok(Out::success().with_code(values[index]))
        }
    }

    struct Subject;

    #[async_trait]
    impl CloudEventFunction for Subject {
        async fn call(&self, _ctx: &InvocationContext, event: &CloudEvent) -> Result<(), FunctionError> {
            match event.subject.as_deref() {
                Some(_) => Ok(()),
                None => Err(FunctionError::failed("missing subject")),
            }
        }
    }

    struct Noop;

    #[async_trait]
    impl OutputTransport for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn send(&self, _output: &str, _component: &ComponentSpec, data: Bytes) -> Result<Bytes, TransportError> {
            Ok(data)
        }
    }

    fn manager(runtime: RuntimeContext) -> RuntimeManager {
        RuntimeManager::new(Arc::new(runtime), Arc::new(PluginPipeline::default()))
    }

    #[tokio::test]
    async fn test_http_handler_result() {
        let manager = manager(RuntimeContext::default());
        let entry = FunctionEntry::builder("created").http(Created).build().unwrap();

        let mut ctx = manager.new_invocation(&entry);
        let request = http::Request::builder()
            .body(Bytes::from_static(b"payload"))
            .unwrap();
        ctx.set_http_request(request, Default::default());

        manager.run_with_hooks(&mut ctx, entry.handler()).await;

        assert!(ctx.error().is_none());
        assert_eq!(ctx.result().code(), 201);
        assert_eq!(ctx.result().data(), &Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_handler_error_sets_internal_error() {
        let manager = manager(RuntimeContext::default());
        let entry = FunctionEntry::builder("failing").open_function(Failing).build().unwrap();

        let mut ctx = manager.new_invocation(&entry);
        manager.run_with_hooks(&mut ctx, entry.handler()).await;

        assert_eq!(ctx.result().status_kind(), StatusKind::InternalError);
        assert!(matches!(ctx.error(), Some(InvocationError::Handler(_))));
    }

    #[tokio::test]
    async fn test_panic_becomes_crash() {
        let manager = manager(RuntimeContext::default());
        let entry = FunctionEntry::builder("panicking").open_function(Panicking).build().unwrap();

        let mut ctx = manager.new_invocation(&entry);
        manager.run_with_hooks(&mut ctx, entry.handler()).await;

        let err = ctx.error().unwrap();
        assert!(err.is_crash());
        assert!(err.to_string().contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_cloud_event_handler() {
        let manager = manager(RuntimeContext::default());
        let entry = FunctionEntry::builder("subject").cloud_event(Subject).build().unwrap();

        let mut ok = manager.new_invocation(&entry);
        ok.set_cloud_event(CloudEvent::new("1", "/test", "test.event").with_subject("s"));
        manager.run_with_hooks(&mut ok, entry.handler()).await;
        assert!(ok.error().is_none());
        assert_eq!(ok.result().status_kind(), StatusKind::Success);

        let mut failed = manager.new_invocation(&entry);
        failed.set_cloud_event(CloudEvent::new("2", "/test", "test.event"));
        manager.run_with_hooks(&mut failed, entry.handler()).await;
        assert!(matches!(failed.error(), Some(InvocationError::Handler(_))));
    }

    #[tokio::test]
    async fn test_transport_bound_only_with_outputs() {
        let entry = FunctionEntry::builder("f").open_function(Failing).build().unwrap();

        let without = manager(RuntimeContext::default()).with_transport(Arc::new(Noop));
        assert!(!without.new_invocation(&entry).has_transport());

        let runtime = RuntimeContext::default()
            .with_output("out", ComponentSpec::new("sink", "bindings.kafka"));
        let with = manager(runtime).with_transport(Arc::new(Noop));
        assert!(with.new_invocation(&entry).has_transport());
    }

    #[tokio::test]
    async fn test_invocation_observes_shutdown() {
        let shutdown = CancellationToken::new();
        let manager = manager(RuntimeContext::default()).with_shutdown(shutdown.clone());
        let entry = FunctionEntry::builder("f").open_function(Failing).build().unwrap();

        let ctx = manager.new_invocation(&entry);
        assert!(!ctx.is_cancelled());
        shutdown.cancel();
        assert!(ctx.is_cancelled());
    }
}
