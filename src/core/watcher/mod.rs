//! # Folder Watcher Module
//!
//! Monitors download directories for new anime files.
//!
//! Only media files are reported; everything else (subtitles, partial
//! downloads, nfo files) is filtered out before the handler sees it.
//!
//! A file being downloaded produces a stream of events. Feed the
//! detections into a [`SettleQueue`] and submit what it releases, so
//! each file is identified once, after it stopped changing.
//!
//! ## Example
//! ```rust,ignore
//! use anime_identifier::core::watcher::{FolderWatcher, WatcherConfig};
//!
//! let mut watcher = FolderWatcher::new(WatcherConfig::default(), |event| {
//!     if let WatcherEvent::FileDetected { path } = event {
//!         pipeline.submit_one(path);
//!     }
//! })?;
//! watcher.watch("/downloads/complete")?;
//! ```

use crate::error::WatcherError;
use crate::events::WatcherEvent;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Extensions treated as anime files
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "ogm", "wmv", "m4v", "webm", "flv", "mov",
];

/// Check if a path looks like a media file
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Configuration for the folder watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How long a file must stay quiet before it is released
    pub debounce_duration: Duration,
    /// Whether to watch subdirectories recursively
    pub recursive: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_secs(2),
            recursive: true,
        }
    }
}

/// Holds detected files until they have been quiet for a while.
///
/// Every path is released at most once; later events for a released
/// path are dropped.
#[derive(Debug)]
pub struct SettleQueue {
    quiet: Duration,
    pending: HashMap<PathBuf, Instant>,
    released: HashSet<PathBuf>,
}

impl SettleQueue {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: HashMap::new(),
            released: HashSet::new(),
        }
    }

    /// Record activity on `path` at `now`
    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        if self.released.contains(&path) {
            debug!(path = %path.display(), "Already released, ignoring");
            return;
        }
        self.pending.insert(path, now);
    }

    /// Paths quiet since at least `now - quiet`, oldest activity first
    pub fn ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled: Vec<(Instant, PathBuf)> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= self.quiet)
            .map(|(path, seen)| (*seen, path.clone()))
            .collect();
        settled.sort();

        settled
            .into_iter()
            .map(|(_, path)| {
                self.pending.remove(&path);
                self.released.insert(path.clone());
                path
            })
            .collect()
    }

    /// Paths still waiting to settle
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Watches folders for media files
pub struct FolderWatcher {
    watcher: RecommendedWatcher,
    config: WatcherConfig,
    watched_paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FolderWatcher {
    /// Create a watcher that hands events to `event_handler`
    pub fn new<F>(config: WatcherConfig, event_handler: F) -> Result<Self, WatcherError>
    where
        F: Fn(WatcherEvent) + Send + 'static,
    {
        let watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            match result {
                Ok(event) => {
                    for detected in Self::process_event(event) {
                        event_handler(detected);
                    }
                }
                Err(e) => event_handler(WatcherEvent::Error {
                    message: e.to_string(),
                }),
            }
        })
        .map_err(|e| WatcherError::InitFailed(e.to_string()))?;

        Ok(Self {
            watcher,
            config,
            watched_paths: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Turn a notify event into detections for the media files it names
    fn process_event(event: Event) -> Vec<WatcherEvent> {
        let relevant = match event.kind {
            EventKind::Create(_) => true,
            // A rename carries (from, to); only the destination is new
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                return event
                    .paths
                    .last()
                    .filter(|p| is_media_file(p))
                    .map(|p| WatcherEvent::FileDetected { path: p.clone() })
                    .into_iter()
                    .collect();
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => true,
            EventKind::Modify(ModifyKind::Data(_)) => true,
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
            _ => false,
        };

        if !relevant {
            return Vec::new();
        }

        event
            .paths
            .into_iter()
            .filter(|p| is_media_file(p))
            .inspect(|p| debug!(path = %p.display(), "Media file detected"))
            .map(|path| WatcherEvent::FileDetected { path })
            .collect()
    }

    /// Start watching a directory
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<(), WatcherError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(WatcherError::PathNotFound(path));
        }

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        self.watcher
            .watch(&path, mode)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if let Ok(mut paths) = self.watched_paths.lock() {
            paths.insert(path);
        }

        Ok(())
    }

    /// Directories currently watched
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths
            .lock()
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.watched_paths
            .lock()
            .map(|paths| paths.contains(path.as_ref()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn media_extensions_are_recognised() {
        assert!(is_media_file(Path::new("/dl/[Grp] Show - 01.mkv")));
        assert!(is_media_file(Path::new("/dl/show.MP4")));
        assert!(is_media_file(Path::new("/dl/show.ogm")));
    }

    #[test]
    fn other_files_are_ignored() {
        assert!(!is_media_file(Path::new("/dl/show.ass")));
        assert!(!is_media_file(Path::new("/dl/show.mkv.part")));
        assert!(!is_media_file(Path::new("/dl/noext")));
    }

    #[test]
    fn create_of_media_file_is_detected() {
        let detected = FolderWatcher::process_event(event(
            EventKind::Create(CreateKind::File),
            &["/dl/ep01.mkv", "/dl/ep01.srt"],
        ));

        assert_eq!(detected.len(), 1);
        assert!(matches!(
            &detected[0],
            WatcherEvent::FileDetected { path } if path == Path::new("/dl/ep01.mkv")
        ));
    }

    #[test]
    fn rename_reports_destination_only() {
        let detected = FolderWatcher::process_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/dl/ep01.mkv.part", "/dl/ep01.mkv"],
        ));

        assert_eq!(detected.len(), 1);
        assert!(matches!(
            &detected[0],
            WatcherEvent::FileDetected { path } if path == Path::new("/dl/ep01.mkv")
        ));
    }

    #[test]
    fn data_change_is_detected() {
        let detected = FolderWatcher::process_event(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/dl/ep02.mp4"],
        ));
        assert_eq!(detected.len(), 1);
    }

    #[test]
    fn removal_is_ignored() {
        let detected = FolderWatcher::process_event(event(
            EventKind::Remove(RemoveKind::File),
            &["/dl/ep01.mkv"],
        ));
        assert!(detected.is_empty());
    }

    #[test]
    fn close_after_write_is_detected() {
        let detected = FolderWatcher::process_event(event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/dl/ep03.mkv"],
        ));
        assert_eq!(detected.len(), 1);
    }

    #[test]
    fn settle_queue_waits_for_quiet_period() {
        let start = Instant::now();
        let mut queue = SettleQueue::new(Duration::from_secs(2));
        let path = PathBuf::from("/dl/ep01.mkv");

        queue.touch(path.clone(), start);
        queue.touch(path.clone(), start + Duration::from_secs(1));

        assert!(queue.ready(start + Duration::from_secs(2)).is_empty());
        assert_eq!(queue.ready(start + Duration::from_secs(3)), vec![path]);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn settle_queue_releases_each_path_once() {
        let start = Instant::now();
        let mut queue = SettleQueue::new(Duration::from_millis(500));
        let path = PathBuf::from("/dl/ep01.mkv");

        // Create followed by data writes
        queue.touch(path.clone(), start);
        queue.touch(path.clone(), start);
        assert_eq!(queue.ready(start + Duration::from_secs(1)), vec![path.clone()]);

        queue.touch(path.clone(), start + Duration::from_secs(2));
        assert!(queue.ready(start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn settle_queue_releases_oldest_first() {
        let start = Instant::now();
        let mut queue = SettleQueue::new(Duration::from_millis(100));

        queue.touch(PathBuf::from("/dl/b.mkv"), start + Duration::from_millis(10));
        queue.touch(PathBuf::from("/dl/a.mkv"), start + Duration::from_millis(20));
        queue.touch(PathBuf::from("/dl/c.mkv"), start);

        assert_eq!(
            queue.ready(start + Duration::from_secs(1)),
            vec![
                PathBuf::from("/dl/c.mkv"),
                PathBuf::from("/dl/b.mkv"),
                PathBuf::from("/dl/a.mkv"),
            ]
        );
    }

    #[test]
    fn watcher_fails_for_nonexistent_path() {
        let (tx, _rx) = mpsc::channel();
        let mut watcher = FolderWatcher::new(WatcherConfig::default(), move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

        let result = watcher.watch("/nonexistent/downloads/folder");
        assert!(matches!(result, Err(WatcherError::PathNotFound(_))));
    }

    #[test]
    fn watcher_tracks_watched_paths() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut watcher = FolderWatcher::new(WatcherConfig::default(), move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

        watcher.watch(temp_dir.path()).unwrap();

        assert!(watcher.is_watching(temp_dir.path()));
        assert_eq!(watcher.watched_paths(), vec![temp_dir.path().to_path_buf()]);
    }
}
