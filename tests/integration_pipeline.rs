//! Integration tests for the pipeline module.
//!
//! These tests run real files through all three stages against an
//! in-memory metadata session and check:
//! - Results come out in submission order
//! - Unknown files are reported once with their ed2k link
//! - Lookups never overlap
//! - Shutdown finishes everything that was queued
//! - Hash, lookup and plugin failures

use anime_identifier::core::hasher::{ContentHash, ContentHasher, Ed2kHasher};
use anime_identifier::core::pipeline::{HashFailurePolicy, Pipeline, PipelineState};
use anime_identifier::core::plugin::{
    CollectorPlugin, PipelineContext, Plugin, RenameConfig, RenamePlugin,
};
use anime_identifier::core::record::IdentificationResult;
use anime_identifier::core::session::{AnimeField, FileField, InMemorySession, RawFileRecord};
use anime_identifier::error::{HashError, PipelineError, PluginError};
use anime_identifier::events::{Event, EventChannel, LookupEvent, PipelineEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Write a file and return its path and ed2k hash
fn create_episode(dir: &Path, name: &str, content: &[u8]) -> (PathBuf, ContentHash) {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    let hash = Ed2kHasher::new().hash_file(&path).unwrap();
    (path, hash)
}

fn record(file_id: u64, episode: &str) -> RawFileRecord {
    RawFileRecord::new(file_id)
        .with_file(FileField::State, "1")
        .with_file(FileField::Crc32, "abcd1234")
        .with_file(FileField::FileType, "mkv")
        .with_anime(AnimeField::RomajiName, "Toaru Kagaku no Railgun")
        .with_anime(AnimeField::EpisodeNumber, episode)
        .with_anime(AnimeField::GroupShortName, "Grp")
}

/// Session that knows every given file
fn session_for(files: &[(PathBuf, ContentHash)]) -> InMemorySession {
    files
        .iter()
        .enumerate()
        .fold(InMemorySession::new(), |session, (i, (_, hash))| {
            session.with_record(
                hash.size,
                &hash.hash,
                record(i as u64 + 1, &format!("{:02}", i + 1)),
            )
        })
}

#[test]
fn results_arrive_in_submission_order() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<_> = (1..=5)
        .map(|i| {
            create_episode(
                temp_dir.path(),
                &format!("ep{:02}.mkv", i),
                format!("episode {}", i).as_bytes(),
            )
        })
        .collect();

    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(collector.clone()))
        .build(session_for(&files));

    pipeline.start().unwrap();
    let paths: Vec<_> = files.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(pipeline.submit(&paths).unwrap(), 5);
    let summary = pipeline.shutdown().unwrap();

    let processed: Vec<_> = collector
        .results()
        .iter()
        .map(|r| r.path().to_path_buf())
        .collect();
    assert_eq!(processed, paths);
    assert_eq!(summary.submitted, 5);
    assert_eq!(summary.identified, 5);
    assert_eq!(summary.processed, 5);
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn identified_record_is_decoded() {
    let temp_dir = TempDir::new().unwrap();
    let file = create_episode(temp_dir.path(), "railgun.mkv", b"railgun");
    let size = file.1.size;

    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(collector.clone()))
        .build(session_for(&[file]));

    pipeline.start().unwrap();
    pipeline.submit_one(temp_dir.path().join("railgun.mkv")).unwrap();
    pipeline.shutdown().unwrap();

    let results = collector.results();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.source.size, size);
    assert_eq!(result.record.file_id, 1);
    assert_eq!(result.record.romaji_name, "Toaru Kagaku no Railgun");
    assert_eq!(result.record.episode_number, "01");
    assert_eq!(result.record.version(), 1);
}

#[test]
fn unknown_file_is_reported_once_with_ed2k_link() {
    let temp_dir = TempDir::new().unwrap();
    let (path, hash) = create_episode(temp_dir.path(), "mystery.mkv", b"nobody knows me");

    let (sender, receiver) = EventChannel::new();
    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(collector.clone()))
        .events(sender)
        .build(InMemorySession::new());

    pipeline.start().unwrap();
    pipeline.submit_one(&path).unwrap();
    let summary = pipeline.shutdown().unwrap();

    let not_found: Vec<_> = receiver
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            Event::Lookup(LookupEvent::NotFound { locator, .. }) => Some(locator),
            _ => None,
        })
        .collect();

    assert_eq!(
        not_found,
        vec![format!("ed2k://|file|mystery.mkv|{}|{}|/", hash.size, hash.hash)]
    );
    assert!(collector.results().is_empty());
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.processed, 0);
}

#[test]
fn lookups_never_overlap() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<_> = (1..=4)
        .map(|i| {
            create_episode(
                temp_dir.path(),
                &format!("ep{:02}.mkv", i),
                format!("content {}", i).as_bytes(),
            )
        })
        .collect();

    let session = session_for(&files).with_lookup_delay(Duration::from_millis(20));
    let activity = session.activity();
    let mut pipeline = Pipeline::builder().build(session);

    pipeline.start().unwrap();
    pipeline.submit(files.iter().map(|(p, _)| p)).unwrap();
    pipeline.shutdown().unwrap();

    assert_eq!(activity.max_concurrent_lookups(), 1);
    assert_eq!(
        activity.lookups.load(std::sync::atomic::Ordering::SeqCst),
        4
    );
}

#[test]
fn shutdown_finishes_queued_files() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<_> = (1..=10)
        .map(|i| {
            create_episode(
                temp_dir.path(),
                &format!("ep{:02}.mkv", i),
                format!("payload {}", i).as_bytes(),
            )
        })
        .collect();

    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(collector.clone()))
        .build(session_for(&files).with_lookup_delay(Duration::from_millis(5)));

    pipeline.start().unwrap();
    pipeline.submit(files.iter().map(|(p, _)| p)).unwrap();
    // Nothing has had time to finish yet
    let summary = pipeline.shutdown().unwrap();

    assert_eq!(summary.processed, 10);
    assert_eq!(collector.results().len(), 10);
}

#[test]
fn directories_and_missing_paths_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let mut pipeline = Pipeline::builder().build(InMemorySession::new());

    pipeline.start().unwrap();
    let queued = pipeline
        .submit([
            temp_dir.path().to_path_buf(),
            temp_dir.path().join("missing.mkv"),
        ])
        .unwrap();
    let summary = pipeline.shutdown().unwrap();

    assert_eq!(queued, 0);
    assert_eq!(summary.submitted, 0);
    assert_eq!(summary.hashed, 0);
}

#[test]
fn submit_after_shutdown_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (path, _) = create_episode(temp_dir.path(), "late.mkv", b"late");
    let mut pipeline = Pipeline::builder().build(InMemorySession::new());

    pipeline.start().unwrap();
    pipeline.shutdown().unwrap();

    let result = pipeline.submit_one(&path);
    assert!(matches!(
        result,
        Err(PipelineError::InvalidState { expected: "running", actual: "stopped" })
    ));
}

/// Hasher that cannot read files named `bad.mkv`
fn flaky_hasher() -> Arc<dyn ContentHasher> {
    Arc::new(|path: &Path| {
        if path.ends_with("bad.mkv") {
            Err(HashError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        } else {
            Ed2kHasher::new().hash_file(path)
        }
    })
}

#[test]
fn unreadable_file_stops_pipeline_by_default() {
    let temp_dir = TempDir::new().unwrap();
    let bad = create_episode(temp_dir.path(), "bad.mkv", b"bad");
    let good = create_episode(temp_dir.path(), "good.mkv", b"good");

    let (sender, receiver) = EventChannel::new();
    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .hasher(flaky_hasher())
        .plugin(Box::new(collector.clone()))
        .events(sender)
        .build(session_for(&[bad.clone(), good.clone()]));

    pipeline.start().unwrap();
    // The hash stage may already be gone when the second file arrives
    let _ = pipeline.submit([&bad.0, &good.0]);
    let result = pipeline.shutdown();

    assert!(matches!(result, Err(PipelineError::Hash(_))));
    assert!(collector.results().is_empty());
    assert!(receiver.drain().iter().any(|event| matches!(
        event,
        Event::Pipeline(PipelineEvent::StageFailed { stage, .. }) if stage == "hasher"
    )));
}

#[test]
fn unreadable_file_is_skipped_when_configured() {
    let temp_dir = TempDir::new().unwrap();
    let bad = create_episode(temp_dir.path(), "bad.mkv", b"bad");
    let good = create_episode(temp_dir.path(), "good.mkv", b"good");

    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .hasher(flaky_hasher())
        .hash_failure(HashFailurePolicy::Skip)
        .plugin(Box::new(collector.clone()))
        .build(session_for(&[bad.clone(), good.clone()]));

    pipeline.start().unwrap();
    pipeline.submit([&bad.0, &good.0]).unwrap();
    let summary = pipeline.shutdown().unwrap();

    assert_eq!(summary.hash_skipped, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(collector.results()[0].path(), good.0.as_path());
}

struct Refusing;

impl Plugin for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }

    fn on_identified(
        &self,
        _ctx: &PipelineContext,
        _result: &IdentificationResult,
    ) -> Result<(), PluginError> {
        Err(PluginError::Failed {
            plugin: "refusing".to_string(),
            hook: "on_identified",
            reason: "no".to_string(),
        })
    }
}

#[test]
fn plugin_failure_stops_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let file = create_episode(temp_dir.path(), "ep01.mkv", b"one");

    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(Refusing))
        .plugin(Box::new(collector.clone()))
        .build(session_for(&[file.clone()]));

    pipeline.start().unwrap();
    pipeline.submit_one(&file.0).unwrap();
    let result = pipeline.shutdown();

    assert!(matches!(result, Err(PipelineError::Plugin(_))));
    assert!(collector.results().is_empty());
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn plugin_failure_is_reported_while_hashing_continues() {
    let temp_dir = TempDir::new().unwrap();
    let files: Vec<_> = (1..=5)
        .map(|i| {
            create_episode(
                temp_dir.path(),
                &format!("ep{:02}.mkv", i),
                format!("slow {}", i).as_bytes(),
            )
        })
        .collect();

    let slow_hasher: Arc<dyn ContentHasher> = Arc::new(|path: &Path| {
        std::thread::sleep(Duration::from_millis(30));
        Ed2kHasher::new().hash_file(path)
    });

    let (sender, receiver) = EventChannel::new();
    let mut pipeline = Pipeline::builder()
        .hasher(slow_hasher)
        .plugin(Box::new(Refusing))
        .events(sender)
        .build(session_for(&files));

    pipeline.start().unwrap();
    let _ = pipeline.submit(files.iter().map(|(p, _)| p));
    let result = pipeline.shutdown();

    assert!(matches!(result, Err(PipelineError::Plugin(_))));

    let failed_stages: Vec<_> = receiver
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            Event::Pipeline(PipelineEvent::StageFailed { stage, .. }) => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(failed_stages, vec!["searcher".to_string()]);
}

#[test]
fn lookup_error_skips_only_that_file() {
    let temp_dir = TempDir::new().unwrap();
    let first = create_episode(temp_dir.path(), "ep01.mkv", b"first");
    let broken = create_episode(temp_dir.path(), "ep02.mkv", b"broken");
    let last = create_episode(temp_dir.path(), "ep03.mkv", b"last");

    let session = session_for(&[first.clone(), broken.clone(), last.clone()])
        .failing_lookup_for(broken.1.size, &broken.1.hash);

    let (sender, receiver) = EventChannel::new();
    let collector = CollectorPlugin::new();
    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(collector.clone()))
        .events(sender)
        .build(session);

    pipeline.start().unwrap();
    pipeline.submit([&first.0, &broken.0, &last.0]).unwrap();
    let summary = pipeline.shutdown().unwrap();

    let failures: Vec<_> = receiver
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            Event::Lookup(LookupEvent::Failed { path, locator, .. }) => Some((path, locator)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, broken.0);
    assert!(failures[0].1.starts_with("ed2k://|file|ep02.mkv|"));

    let processed: Vec<_> = collector
        .results()
        .iter()
        .map(|r| r.path().to_path_buf())
        .collect();
    assert_eq!(processed, vec![first.0.clone(), last.0.clone()]);
    assert_eq!(summary.lookup_failed, 1);
    assert_eq!(summary.processed, 2);
}

#[test]
fn rename_plugin_renames_identified_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = create_episode(temp_dir.path(), "[Grp] railgun 01.mkv", b"railgun one");

    let mut pipeline = Pipeline::builder()
        .plugin(Box::new(RenamePlugin::new(RenameConfig::default())))
        .build(session_for(&[file.clone()]));

    pipeline.start().unwrap();
    pipeline.submit_one(&file.0).unwrap();
    pipeline.shutdown().unwrap();

    assert!(!file.0.exists());
    assert!(temp_dir
        .path()
        .join("Toaru Kagaku no Railgun - 01 [Grp](ABCD1234).mkv")
        .exists());
}

#[test]
fn test_mode_leaves_files_alone() {
    let temp_dir = TempDir::new().unwrap();
    let file = create_episode(temp_dir.path(), "ep01.mkv", b"untouched");

    let mut pipeline = Pipeline::builder()
        .test_mode(true)
        .plugin(Box::new(RenamePlugin::default()))
        .build(session_for(&[file.clone()]));

    pipeline.start().unwrap();
    pipeline.submit_one(&file.0).unwrap();
    let summary = pipeline.shutdown().unwrap();

    assert_eq!(summary.processed, 1);
    assert!(file.0.exists());
}

#[test]
fn rejected_login_leaves_pipeline_unstarted() {
    let mut pipeline = Pipeline::builder().build(InMemorySession::new().rejecting_login());

    assert!(matches!(pipeline.start(), Err(PipelineError::Session(_))));
    assert_eq!(pipeline.state(), PipelineState::Created);
}
