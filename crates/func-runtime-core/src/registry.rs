//! Function registry.
//!
//! The [`Registry`] maps function names to [`FunctionEntry`] values. It is
//! filled before the framework starts and is read-only afterwards, so lookups
//! need no synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use func_runtime_common::RegistrationError;

use crate::function::FunctionEntry;

/// Process-wide catalog of deployable functions.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Arc<FunctionEntry>>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if the name is taken; the registry is left
    /// unchanged.
    pub fn register(&mut self, entry: FunctionEntry) -> Result<(), RegistrationError> {
        if self.index.contains_key(entry.name()) {
            return Err(RegistrationError::DuplicateName {
                name: entry.name().to_string(),
            });
        }

        debug!(
            function = entry.name(),
            trigger = %entry.trigger_kind(),
            path = entry.path().unwrap_or("<default>"),
            "Registered function"
        );

        self.index.insert(entry.name().to_string(), self.entries.len());
        self.entries.push(Arc::new(entry));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<FunctionEntry>> {
        self.index.get(name).map(|&i| self.entries[i].clone())
    }

    /// All names, in registration order.
    pub fn list_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }

    /// All entries, in registration order.
    pub fn entries(&self) -> &[Arc<FunctionEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.list_names())
            .finish()
    }
}
