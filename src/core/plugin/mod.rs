//! # Plugin Module
//!
//! Extension points invoked by the pipeline stages.
//!
//! ## Hooks
//! - `on_hashed` - after the hash stage computed a file's ed2k hash
//! - `on_identified` - after the lookup stage decoded a matching record
//! - `on_processed` - in the terminal action stage
//!
//! Every hook has a no-op default, so a plugin implements only the
//! ones it cares about. Plugins run in registration order, one at a
//! time, and an error from any of them stops the stage that called it.
//!
//! ## Built-in plugins
//! - `RenamePlugin` - renames identified files from a template
//! - `CollectorPlugin` - keeps identified results for reporting

mod collector;
mod rename;

pub use collector::CollectorPlugin;
pub use rename::{RenameConfig, RenamePlugin, DEFAULT_RENAME_PATTERN};

use crate::core::record::{HashResult, IdentificationResult};
use crate::error::PluginError;
use tracing::debug;

/// Pipeline-wide settings visible to plugins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineContext {
    /// Plugins must not modify files when set
    pub test_mode: bool,
}

/// A pipeline extension
pub trait Plugin: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Called once a file has been hashed
    fn on_hashed(&self, _ctx: &PipelineContext, _result: &HashResult) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once a file has been identified
    fn on_identified(
        &self,
        _ctx: &PipelineContext,
        _result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called by the terminal action stage
    fn on_processed(
        &self,
        _ctx: &PipelineContext,
        _result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Ordered list of plugins.
///
/// Filled before the pipeline starts and shared read-only by the
/// stage workers afterwards.
#[derive(Default)]
pub struct HookRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin; it runs after every plugin registered before it
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "Registered plugin");
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Names in dispatch order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn dispatch_hashed(
        &self,
        ctx: &PipelineContext,
        result: &HashResult,
    ) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), path = %result.path.display(), "Calling on_hashed");
            plugin.on_hashed(ctx, result)?;
        }
        Ok(())
    }

    pub fn dispatch_identified(
        &self,
        ctx: &PipelineContext,
        result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), path = %result.path().display(), "Calling on_identified");
            plugin.on_identified(ctx, result)?;
        }
        Ok(())
    }

    pub fn dispatch_processed(
        &self,
        ctx: &PipelineContext,
        result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            debug!(plugin = plugin.name(), path = %result.path().display(), "Calling on_processed");
            plugin.on_processed(ctx, result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn on_hashed(&self, _ctx: &PipelineContext, _result: &HashResult) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push(self.name.to_string());
            if self.fail {
                return Err(PluginError::Failed {
                    plugin: self.name.to_string(),
                    hook: "on_hashed",
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Silent;

    impl Plugin for Silent {
        fn name(&self) -> &str {
            "silent"
        }
    }

    fn recorder(name: &'static str, calls: &Arc<Mutex<Vec<String>>>, fail: bool) -> Box<dyn Plugin> {
        Box::new(Recorder {
            name,
            calls: Arc::clone(calls),
            fail,
        })
    }

    fn hash_result() -> HashResult {
        HashResult::new("/anime/ep01.mkv", 3, "abc")
    }

    #[test]
    fn dispatch_runs_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        assert!(registry.is_empty());
        registry.register(recorder("first", &calls, false));
        registry.register(Box::new(Silent));
        registry.register(recorder("second", &calls, false));
        assert_eq!(registry.len(), 3);

        registry
            .dispatch_hashed(&PipelineContext::default(), &hash_result())
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(registry.names(), vec!["first", "silent", "second"]);
    }

    #[test]
    fn missing_hooks_are_no_ops() {
        let mut registry = HookRegistry::new();
        registry.register(Box::new(Silent));
        assert!(registry
            .dispatch_hashed(&PipelineContext::default(), &hash_result())
            .is_ok());
    }

    #[test]
    fn failing_plugin_stops_dispatch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(recorder("broken", &calls, true));
        registry.register(recorder("after", &calls, false));

        let result = registry.dispatch_hashed(&PipelineContext::default(), &hash_result());

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), vec!["broken"]);
    }
}
