//! Pipeline orchestration: lifecycle, channels and shutdown.

use super::message::{FileTask, StageMessage};
use super::stages::{
    ActionStage, HashFailurePolicy, HashStage, LookupStage, StageCounters, StageShared, HASHER,
    PROCESSOR, SEARCHER,
};
use crate::core::hasher::{ContentHasher, Ed2kHasher};
use crate::core::plugin::{HookRegistry, PipelineContext, Plugin};
use crate::core::session::{AnimeField, Credentials, FileField, MetadataSession};
use crate::error::PipelineError;
use crate::events::{Event, EventSender, PipelineEvent, PipelineSummary, null_sender};
use crossbeam_channel::{unbounded, Sender};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Lifecycle of a pipeline instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl PipelineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            PipelineState::Created => "created",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Login used when the pipeline starts
    pub credentials: Credentials,
    /// Settings passed to every plugin hook
    pub context: PipelineContext,
    /// What to do with files that cannot be read
    pub hash_failure: HashFailurePolicy,
    /// File columns requested per lookup
    pub file_fields: Vec<FileField>,
    /// Anime columns requested per lookup
    pub anime_fields: Vec<AnimeField>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            context: PipelineContext::default(),
            hash_failure: HashFailurePolicy::Abort,
            file_fields: FileField::DEFAULT.to_vec(),
            anime_fields: AnimeField::DEFAULT.to_vec(),
        }
    }
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    registry: HookRegistry,
    hasher: Option<Arc<dyn ContentHasher>>,
    events: Option<EventSender>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            registry: HookRegistry::new(),
            hasher: None,
            events: None,
        }
    }

    /// Set the login used on start
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Tell plugins not to touch files
    pub fn test_mode(mut self, test_mode: bool) -> Self {
        self.config.context.test_mode = test_mode;
        self
    }

    /// Set the policy for unreadable files
    pub fn hash_failure(mut self, policy: HashFailurePolicy) -> Self {
        self.config.hash_failure = policy;
        self
    }

    /// Set the file columns requested per lookup
    pub fn file_fields(mut self, fields: Vec<FileField>) -> Self {
        self.config.file_fields = fields;
        self
    }

    /// Set the anime columns requested per lookup
    pub fn anime_fields(mut self, fields: Vec<AnimeField>) -> Self {
        self.config.anime_fields = fields;
        self
    }

    /// Append a plugin
    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.registry.register(plugin);
        self
    }

    /// Replace the ed2k hasher
    pub fn hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Report progress through `events`
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the pipeline around `session`
    pub fn build<S: MetadataSession + 'static>(self, session: S) -> Pipeline {
        let session: Box<dyn MetadataSession> = Box::new(session);
        Pipeline {
            state: PipelineState::Created,
            config: self.config,
            registry: Arc::new(self.registry),
            hasher: self.hasher.unwrap_or_else(|| Arc::new(Ed2kHasher::new())),
            session: Arc::new(Mutex::new(session)),
            events: self.events.unwrap_or_else(null_sender),
            counters: Arc::new(StageCounters::default()),
            intake: None,
            workers: Vec::new(),
            started_at: None,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Worker {
    stage: &'static str,
    handle: JoinHandle<Result<(), PipelineError>>,
}

/// Hash → lookup → action pipeline.
///
/// ```rust,ignore
/// let mut pipeline = Pipeline::builder()
///     .credentials(credentials)
///     .plugin(Box::new(RenamePlugin::default()))
///     .build(AniDbSession::new(AniDbConfig::default()));
///
/// pipeline.start()?;
/// pipeline.submit(&paths)?;
/// let summary = pipeline.shutdown()?;
/// ```
pub struct Pipeline {
    state: PipelineState,
    config: PipelineConfig,
    registry: Arc<HookRegistry>,
    hasher: Arc<dyn ContentHasher>,
    session: Arc<Mutex<Box<dyn MetadataSession>>>,
    events: EventSender,
    counters: Arc<StageCounters>,
    intake: Option<Sender<StageMessage<FileTask>>>,
    workers: Vec<Worker>,
    started_at: Option<Instant>,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Plugin names in dispatch order
    pub fn plugin_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Append a plugin before the pipeline starts
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PipelineError> {
        self.expect_state(PipelineState::Created)?;
        let registry = Arc::get_mut(&mut self.registry).ok_or(PipelineError::InvalidState {
            expected: PipelineState::Created.as_str(),
            actual: self.state.as_str(),
        })?;
        registry.register(plugin);
        Ok(())
    }

    /// Log in and start the three stage workers.
    ///
    /// A failed login leaves the pipeline in `Created` with nothing
    /// started.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.expect_state(PipelineState::Created)?;

        {
            let mut session = self
                .session
                .lock()
                .map_err(|_| PipelineError::SessionPoisoned)?;
            session.connect(&self.config.credentials)?;
        }

        if self.config.context.test_mode {
            info!("Running in test mode. Files won't be renamed.");
        }
        if self.registry.is_empty() {
            debug!("No plugins registered, identified files will only be counted");
        } else {
            info!(plugins = self.registry.len(), "Plugins registered");
        }

        let (intake, file_rx) = unbounded();
        let (hash_tx, hash_rx) = unbounded();
        let (ident_tx, ident_rx) = unbounded();

        let shared = StageShared {
            registry: Arc::clone(&self.registry),
            context: self.config.context.clone(),
            events: self.events.clone(),
            counters: Arc::clone(&self.counters),
        };

        let hash_stage = HashStage {
            shared: shared.clone(),
            hasher: Arc::clone(&self.hasher),
            policy: self.config.hash_failure,
            input: file_rx,
            output: hash_tx,
        };
        let lookup_stage = LookupStage {
            shared: shared.clone(),
            session: Arc::clone(&self.session),
            file_fields: self.config.file_fields.clone(),
            anime_fields: self.config.anime_fields.clone(),
            input: hash_rx,
            output: ident_tx,
        };
        let action_stage = ActionStage {
            shared,
            input: ident_rx,
        };

        if let Err(e) = self.spawn_stages(hash_stage, lookup_stage, action_stage) {
            // Dropping the intake disconnects whatever did start
            drop(intake);
            self.join_workers();
            self.logout();
            return Err(e);
        }

        self.intake = Some(intake);
        self.started_at = Some(Instant::now());
        self.state = PipelineState::Running;
        self.events.send(Event::Pipeline(PipelineEvent::Started));
        info!("Workers are up and waiting.");
        Ok(())
    }

    /// Queue files for identification.
    ///
    /// Entries that are not existing regular files are ignored.
    /// Returns how many files were queued.
    pub fn submit<I, P>(&self, paths: I) -> Result<usize, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.expect_state(PipelineState::Running)?;
        let intake = self.intake.as_ref().ok_or(PipelineError::StageClosed { stage: HASHER })?;

        let mut queued = 0;
        for path in paths {
            let path = path.as_ref();
            if !path.is_file() {
                debug!(path = %path.display(), "Ignoring, not a regular file");
                continue;
            }

            intake
                .send(StageMessage::Item(FileTask::new(path)))
                .map_err(|_| PipelineError::StageClosed { stage: HASHER })?;

            self.counters
                .submitted
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.events.send(Event::Pipeline(PipelineEvent::Submitted {
                path: path.to_path_buf(),
            }));
            info!(path = %path.display(), "Added to queue");
            queued += 1;
        }
        Ok(queued)
    }

    /// Queue a single file
    pub fn submit_one(&self, path: impl AsRef<Path>) -> Result<usize, PipelineError> {
        self.submit(std::iter::once(path))
    }

    /// Drain the queues, stop the workers and log out.
    ///
    /// Files queued before this call finish first. Returns the run
    /// summary, or the error that stopped a stage early.
    pub fn shutdown(&mut self) -> Result<PipelineSummary, PipelineError> {
        self.expect_state(PipelineState::Running)?;

        self.state = PipelineState::Draining;
        self.events.send(Event::Pipeline(PipelineEvent::Draining));
        if let Some(intake) = self.intake.take() {
            let _ = intake.send(StageMessage::EndOfStream);
        }

        let failure = self.join_workers();
        self.logout();

        let duration_ms = self
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let summary = self.counters.summary(duration_ms);

        self.state = PipelineState::Stopped;
        self.events.send(Event::Pipeline(PipelineEvent::Stopped {
            summary: summary.clone(),
        }));
        info!(
            processed = summary.processed,
            not_found = summary.not_found,
            "Pipeline stopped"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn expect_state(&self, expected: PipelineState) -> Result<(), PipelineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    fn spawn_stages(
        &mut self,
        hash_stage: HashStage,
        lookup_stage: LookupStage,
        action_stage: ActionStage,
    ) -> Result<(), PipelineError> {
        self.spawn(HASHER, move || hash_stage.run())?;
        self.spawn(SEARCHER, move || lookup_stage.run())?;
        self.spawn(PROCESSOR, move || action_stage.run())
    }

    fn spawn<F>(&mut self, stage: &'static str, body: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<(), PipelineError> + Send + 'static,
    {
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-stage", stage))
            .spawn(move || {
                let _span = info_span!("stage", name = stage).entered();
                let result = body();
                if let Err(e) = &result {
                    error!(error = %e, "Stage stopped");
                    events.send(Event::Pipeline(PipelineEvent::StageFailed {
                        stage: stage.to_string(),
                        message: e.to_string(),
                    }));
                }
                result
            })
            .map_err(|source| PipelineError::Spawn { stage, source })?;

        self.workers.push(Worker { stage, handle });
        Ok(())
    }

    /// Wait for every worker, returning the first failure
    fn join_workers(&mut self) -> Option<PipelineError> {
        let mut failure = None;
        for worker in self.workers.drain(..) {
            let outcome = match worker.handle.join() {
                Ok(result) => result,
                Err(_) => Err(PipelineError::StagePanicked {
                    stage: worker.stage,
                }),
            };
            if let Err(e) = outcome {
                failure.get_or_insert(e);
            }
        }
        failure
    }

    fn logout(&self) {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = session.logout() {
            warn!(error = %e, "Logout failed");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            warn!("Pipeline dropped while running, draining queued files");
            let _ = self.shutdown();
        }
    }
}
