//! The three stage workers.
//!
//! Each stage owns the receiving end of its input channel and the
//! sending end of its output channel. A stage ends when it receives
//! `EndOfStream` (forwarded downstream, except by the terminal action
//! stage) or when its input channel is disconnected because the
//! upstream stage failed.

use super::message::{FileTask, StageMessage};
use crate::core::hasher::ContentHasher;
use crate::core::plugin::{HookRegistry, PipelineContext};
use crate::core::record::{AnimeFileRecord, HashResult, IdentificationResult};
use crate::core::session::{AnimeField, FileField, LookupQuery, MetadataSession};
use crate::error::PipelineError;
use crate::events::{
    ActionEvent, Event, EventSender, HashEvent, LookupEvent, PipelineSummary,
};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub(crate) const HASHER: &str = "hasher";
pub(crate) const SEARCHER: &str = "searcher";
pub(crate) const PROCESSOR: &str = "processor";

/// What the hash stage does when a file cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashFailurePolicy {
    /// Stop the pipeline
    #[default]
    Abort,
    /// Log a warning and carry on with the next file
    Skip,
}

/// Per-outcome counters shared by the stages
#[derive(Debug, Default)]
pub(crate) struct StageCounters {
    pub submitted: AtomicUsize,
    pub hashed: AtomicUsize,
    pub hash_skipped: AtomicUsize,
    pub identified: AtomicUsize,
    pub not_found: AtomicUsize,
    pub lookup_failed: AtomicUsize,
    pub processed: AtomicUsize,
}

impl StageCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn summary(&self, duration_ms: u64) -> PipelineSummary {
        PipelineSummary {
            submitted: self.submitted.load(Ordering::SeqCst),
            hashed: self.hashed.load(Ordering::SeqCst),
            hash_skipped: self.hash_skipped.load(Ordering::SeqCst),
            identified: self.identified.load(Ordering::SeqCst),
            not_found: self.not_found.load(Ordering::SeqCst),
            lookup_failed: self.lookup_failed.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            duration_ms,
        }
    }
}

/// State every stage needs besides its channels
#[derive(Clone)]
pub(crate) struct StageShared {
    pub registry: Arc<HookRegistry>,
    pub context: PipelineContext,
    pub events: EventSender,
    pub counters: Arc<StageCounters>,
}

/// Read the next item, `None` on end of stream or a vanished upstream
fn next_item<T>(input: &Receiver<StageMessage<T>>) -> Option<T> {
    match input.recv() {
        Ok(StageMessage::Item(item)) => Some(item),
        Ok(StageMessage::EndOfStream) | Err(_) => None,
    }
}

/// Pass an item downstream. `false` once the next stage has stopped,
/// which only happens after it failed and reported its own error.
fn forward<T>(output: &Sender<StageMessage<T>>, item: T, next_stage: &'static str) -> bool {
    if output.send(StageMessage::Item(item)).is_ok() {
        return true;
    }
    debug!(next = next_stage, "Next stage is gone, stopping");
    false
}

pub(crate) struct HashStage {
    pub shared: StageShared,
    pub hasher: Arc<dyn ContentHasher>,
    pub policy: HashFailurePolicy,
    pub input: Receiver<StageMessage<FileTask>>,
    pub output: Sender<StageMessage<HashResult>>,
}

impl HashStage {
    pub fn run(self) -> Result<(), PipelineError> {
        loop {
            debug!("Waiting for next file to hash");
            let Some(task) = next_item(&self.input) else {
                break;
            };
            debug!(path = %task.path.display(), "Hashing");

            let hash = match self.hasher.hash_file(&task.path) {
                Ok(hash) => hash,
                Err(e) if self.policy == HashFailurePolicy::Skip => {
                    warn!(path = %task.path.display(), error = %e, "Skipping unreadable file");
                    StageCounters::bump(&self.shared.counters.hash_skipped);
                    self.shared.events.send(Event::Hash(HashEvent::Skipped {
                        path: task.path,
                        message: e.to_string(),
                    }));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let result = HashResult::new(task.path, hash.size, hash.hash);
            self.shared
                .registry
                .dispatch_hashed(&self.shared.context, &result)?;

            StageCounters::bump(&self.shared.counters.hashed);
            self.shared.events.send(Event::Hash(HashEvent::Hashed {
                path: result.path.clone(),
                size: result.size,
                hash: result.content_hash.clone(),
            }));
            info!(file = %result.file_name(), hash = %result.content_hash, size = result.size, "Hashed");

            if !forward(&self.output, result, SEARCHER) {
                return Ok(());
            }
        }

        let _ = self.output.send(StageMessage::EndOfStream);
        Ok(())
    }
}

pub(crate) struct LookupStage {
    pub shared: StageShared,
    pub session: Arc<Mutex<Box<dyn MetadataSession>>>,
    pub file_fields: Vec<FileField>,
    pub anime_fields: Vec<AnimeField>,
    pub input: Receiver<StageMessage<HashResult>>,
    pub output: Sender<StageMessage<IdentificationResult>>,
}

impl LookupStage {
    pub fn run(self) -> Result<(), PipelineError> {
        loop {
            debug!("Waiting for next file to get info");
            let Some(source) = next_item(&self.input) else {
                break;
            };
            let name = source.file_name();
            debug!(file = %name, "Searching");

            // One full query-decode cycle per lock
            let mut session = self
                .session
                .lock()
                .map_err(|_| PipelineError::SessionPoisoned)?;

            let query = LookupQuery {
                name: &name,
                size: source.size,
                hash: &source.content_hash,
                file_fields: &self.file_fields,
                anime_fields: &self.anime_fields,
            };

            let raw = match session.lookup(&query) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    let locator = source.ed2k_link();
                    warn!(path = %source.path.display(), "Can't be found. {}", locator);
                    StageCounters::bump(&self.shared.counters.not_found);
                    self.shared.events.send(Event::Lookup(LookupEvent::NotFound {
                        path: source.path,
                        locator,
                    }));
                    continue;
                }
                Err(e) => {
                    let locator = source.ed2k_link();
                    warn!(path = %source.path.display(), error = %e, "Lookup failed. {}", locator);
                    StageCounters::bump(&self.shared.counters.lookup_failed);
                    self.shared.events.send(Event::Lookup(LookupEvent::Failed {
                        path: source.path,
                        locator,
                        message: e.to_string(),
                    }));
                    continue;
                }
            };

            let record = AnimeFileRecord::from_raw(&raw);
            info!(
                file = %name,
                anime = %record.romaji_name,
                episode = %record.episode_number,
                fid = record.file_id,
                aid = record.anime_id,
                "Identified"
            );

            let result = IdentificationResult { source, record };
            self.shared
                .registry
                .dispatch_identified(&self.shared.context, &result)?;

            StageCounters::bump(&self.shared.counters.identified);
            self.shared.events.send(Event::Lookup(LookupEvent::Identified {
                path: result.source.path.clone(),
                file_id: result.record.file_id,
                anime: result.record.romaji_name.clone(),
                episode: result.record.episode_number.clone(),
            }));

            if !forward(&self.output, result, PROCESSOR) {
                return Ok(());
            }
            debug!(file = %name, "Added to process queue");
            drop(session);
        }

        let _ = self.output.send(StageMessage::EndOfStream);
        Ok(())
    }
}

pub(crate) struct ActionStage {
    pub shared: StageShared,
    pub input: Receiver<StageMessage<IdentificationResult>>,
}

impl ActionStage {
    pub fn run(self) -> Result<(), PipelineError> {
        loop {
            debug!("Waiting for next file to process");
            let Some(result) = next_item(&self.input) else {
                break;
            };
            debug!(file = %result.source.file_name(), "Processing");

            self.shared
                .registry
                .dispatch_processed(&self.shared.context, &result)?;

            StageCounters::bump(&self.shared.counters.processed);
            self.shared.events.send(Event::Action(ActionEvent::Processed {
                path: result.source.path,
            }));
        }
        Ok(())
    }
}
