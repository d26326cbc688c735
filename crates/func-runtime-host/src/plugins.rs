//! Built-in plugins.
//!
//! These are registered in the catalog before any custom plugin, so a custom
//! plugin can never shadow them:
//!
//! - [`ExamplePlugin`] (`plugin-example`): counts invocations and tags each
//!   context with its sequence number
//! - [`LoggingPlugin`] (`logging`): logs the start and outcome of every
//!   invocation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use func_runtime_common::HookError;
use func_runtime_core::{InvocationContext, Plugin};

/// Catalog name of [`ExamplePlugin`].
pub const EXAMPLE_PLUGIN: &str = "plugin-example";

/// Catalog name of [`LoggingPlugin`].
pub const LOGGING_PLUGIN: &str = "logging";

/// All built-in plugins, in catalog order.
pub fn builtin_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(ExamplePlugin::new()), Arc::new(LoggingPlugin)]
}

/// Sequence number stored on the context by [`ExamplePlugin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationSeq(pub u64);

/// Counts invocations.
///
/// The pre-hook stores an [`InvocationSeq`] in the context extensions; the
/// post-hook reads it back and logs it together with the result code.
#[derive(Debug, Default)]
pub struct ExamplePlugin {
    count: AtomicU64,
}

impl ExamplePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations seen by the pre-hook so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Plugin for ExamplePlugin {
    fn name(&self) -> &str {
        EXAMPLE_PLUGIN
    }

    async fn exec_pre_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError> {
        let seq = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        ctx.extensions_mut().insert(InvocationSeq(seq));
        debug!(plugin = EXAMPLE_PLUGIN, seq, "Pre-hook executed");
        Ok(())
    }

    async fn exec_post_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError> {
        // The pre-hook may have been skipped by an earlier plugin.
        let seq = ctx.extensions().get::<InvocationSeq>().map(|s| s.0);
        info!(
            plugin = EXAMPLE_PLUGIN,
            seq,
            code = ctx.result().code(),
            "Post-hook executed"
        );
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct StartedAt(Instant);

/// Logs each invocation's start and outcome.
#[derive(Debug, Default)]
pub struct LoggingPlugin;

#[async_trait]
impl Plugin for LoggingPlugin {
    fn name(&self) -> &str {
        LOGGING_PLUGIN
    }

    async fn exec_pre_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError> {
        ctx.extensions_mut().insert(StartedAt(Instant::now()));
        info!(
            request_id = %ctx.request_id(),
            function = %ctx.function_name(),
            trigger = %ctx.trigger(),
            "Invocation started"
        );
        Ok(())
    }

    async fn exec_post_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError> {
        let duration_ms = ctx
            .extensions()
            .get::<StartedAt>()
            .map(|s| s.0.elapsed().as_millis() as u64);
        let request_id = ctx.request_id();
        let code = ctx.result().code();

        match ctx.error() {
            None => info!(request_id, code, duration_ms, "Invocation succeeded"),
            Some(e) => warn!(request_id, code, duration_ms, error = %e, "Invocation failed"),
        }
        Ok(())
    }
}
