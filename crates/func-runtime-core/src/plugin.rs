//! Plugin hooks around handler execution.
//!
//! - [`Plugin`]: A unit of cross-cutting logic with a pre- and a post-hook
//! - [`PluginCatalog`]: All plugins known to the process, by name
//! - [`PluginPipeline`]: The ordered pre/post lists selected for a deployment
//!
//! The pipeline is resolved once at startup and is read concurrently by every
//! invocation afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use func_runtime_common::HookError;

use crate::context::InvocationContext;

/// A plugin executed before and/or after the user handler.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Catalog name, matched against the deployment's plugin lists.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "v1"
    }

    /// Runs before the handler. An error skips the remaining pre-hooks and
    /// the handler itself.
    async fn exec_pre_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError>;

    /// Runs after the handler, even when something earlier failed.
    async fn exec_post_hook(&self, ctx: &mut InvocationContext) -> Result<(), HookError>;
}

/// Plugins available to the process, keyed by name.
///
/// The first plugin registered under a name wins.
#[derive(Default)]
pub struct PluginCatalog {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    order: Vec<String>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. Returns `false` and keeps the existing one if the name
    /// is taken.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> bool {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            debug!(plugin = %name, "Plugin name already registered, skipping");
            return false;
        }
        self.order.push(name.clone());
        self.plugins.insert(name, plugin);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("plugins", &self.order)
            .finish()
    }
}

/// Ordered pre- and post-hook lists.
#[derive(Default, Clone)]
pub struct PluginPipeline {
    pre: Vec<Arc<dyn Plugin>>,
    post: Vec<Arc<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new(pre: Vec<Arc<dyn Plugin>>, post: Vec<Arc<dyn Plugin>>) -> Self {
        Self { pre, post }
    }

    /// Resolve plugin names against the catalog.
    ///
    /// Unknown names are dropped with a warning.
    pub fn resolve(catalog: &PluginCatalog, pre_names: &[String], post_names: &[String]) -> Self {
        let lookup = |stage: &str, names: &[String]| -> Vec<Arc<dyn Plugin>> {
            info!("Plugins for {stage}-hook stage:");
            names
                .iter()
                .filter_map(|name| {
                    let plugin = catalog.get(name);
                    match &plugin {
                        Some(p) => info!(plugin = %name, version = p.version(), "- {name}"),
                        None => warn!(plugin = %name, stage, "Plugin not found, skipping"),
                    }
                    plugin
                })
                .collect()
        };

        Self {
            pre: lookup("pre", pre_names),
            post: lookup("post", post_names),
        }
    }

    pub fn pre(&self) -> &[Arc<dyn Plugin>] {
        &self.pre
    }

    pub fn post(&self) -> &[Arc<dyn Plugin>] {
        &self.post
    }

    /// Run pre-hooks in order, stopping at the first error.
    pub async fn run_pre(&self, ctx: &mut InvocationContext) -> Result<(), HookError> {
        for plugin in &self.pre {
            debug!(plugin = plugin.name(), "Executing pre-hook");
            plugin.exec_pre_hook(ctx).await?;
        }
        Ok(())
    }

    /// Run every post-hook in order.
    ///
    /// Failures are recorded on the context (an earlier error is kept) and do
    /// not stop later hooks.
    pub async fn run_post(&self, ctx: &mut InvocationContext) {
        for plugin in &self.post {
            debug!(plugin = plugin.name(), "Executing post-hook");
            if let Err(e) = plugin.exec_post_hook(ctx).await {
                warn!(plugin = plugin.name(), error = %e, "Post-hook failed");
                ctx.record_error(e.into());
            }
        }
    }
}

impl std::fmt::Debug for PluginPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |list: &[Arc<dyn Plugin>]| list.iter().map(|p| p.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("PluginPipeline")
            .field("pre", &names(&self.pre))
            .field("post", &names(&self.post))
            .finish()
    }
}
