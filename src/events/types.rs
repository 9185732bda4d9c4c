//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the identification pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Hash stage events
    Hash(HashEvent),
    /// Lookup stage events
    Lookup(LookupEvent),
    /// Action stage events
    Action(ActionEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
    /// Folder watcher events
    Watcher(WatcherEvent),
}

/// Events from the folder watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WatcherEvent {
    /// Watcher started monitoring a folder
    Started { path: PathBuf },
    /// A new or modified media file was detected
    FileDetected { path: PathBuf },
    /// An error occurred
    Error { message: String },
}

/// Events from the hash stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HashEvent {
    /// A file was hashed and queued for lookup
    Hashed {
        path: PathBuf,
        size: u64,
        hash: String,
    },
    /// A file could not be read and was skipped
    Skipped { path: PathBuf, message: String },
}

/// Events from the lookup stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LookupEvent {
    /// The remote service identified the file
    Identified {
        path: PathBuf,
        file_id: u64,
        anime: String,
        episode: String,
    },
    /// The remote service has no record for this hash
    NotFound { path: PathBuf, locator: String },
    /// The lookup failed for this file only
    Failed {
        path: PathBuf,
        locator: String,
        message: String,
    },
}

/// Events from the action stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionEvent {
    /// All plugins ran their processing hook for this file
    Processed { path: PathBuf },
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Workers are up and waiting
    Started,
    /// A file was accepted onto the hash queue
    Submitted { path: PathBuf },
    /// End of stream was sent, queued files are finishing
    Draining,
    /// All workers exited and the session was closed
    Stopped { summary: PipelineSummary },
    /// A stage stopped because of a fatal error
    StageFailed { stage: String, message: String },
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Files accepted by submit
    pub submitted: usize,
    /// Files hashed successfully
    pub hashed: usize,
    /// Files skipped because they could not be read
    pub hash_skipped: usize,
    /// Files the remote service identified
    pub identified: usize,
    /// Files with no remote match
    pub not_found: usize,
    /// Files whose lookup failed
    pub lookup_failed: usize,
    /// Files that went through the action stage
    pub processed: usize,
    /// Time from start to stop in milliseconds
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Lookup(LookupEvent::NotFound {
            path: PathBuf::from("/anime/ep01.mkv"),
            locator: "ed2k://|file|ep01.mkv|3|abc|/".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Lookup(LookupEvent::NotFound { locator, .. }) => {
                assert!(locator.starts_with("ed2k://|file|"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn pipeline_summary_is_serializable() {
        let summary = PipelineSummary {
            submitted: 12,
            hashed: 12,
            identified: 10,
            not_found: 2,
            processed: 10,
            duration_ms: 5000,
            ..Default::default()
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"not_found\":2"));
    }
}
