//! Plugin that keeps every processed result.

use super::{PipelineContext, Plugin};
use crate::core::record::IdentificationResult;
use crate::error::PluginError;
use std::sync::{Arc, Mutex};

/// Collects processed results in arrival order
#[derive(Clone, Default)]
pub struct CollectorPlugin {
    results: Arc<Mutex<Vec<IdentificationResult>>>,
}

impl CollectorPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything collected so far
    pub fn results(&self) -> Vec<IdentificationResult> {
        self.results
            .lock()
            .map(|results| results.clone())
            .unwrap_or_default()
    }
}

impl Plugin for CollectorPlugin {
    fn name(&self) -> &str {
        "collector"
    }

    fn on_processed(
        &self,
        _ctx: &PipelineContext,
        result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        let mut results = self.results.lock().map_err(|_| PluginError::Failed {
            plugin: self.name().to_string(),
            hook: "on_processed",
            reason: "result list lock poisoned".to_string(),
        })?;
        results.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{AnimeFileRecord, HashResult};
    use crate::core::session::RawFileRecord;

    #[test]
    fn clones_share_results() {
        let collector = CollectorPlugin::new();
        let handle = collector.clone();

        let result = IdentificationResult {
            source: HashResult::new("/anime/ep01.mkv", 3, "abc"),
            record: AnimeFileRecord::from_raw(&RawFileRecord::new(1)),
        };
        collector
            .on_processed(&PipelineContext::default(), &result)
            .unwrap();

        assert_eq!(handle.results(), vec![result]);
    }
}
