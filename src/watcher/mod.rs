//! Folder watcher
//!
//! Recursively monitors the watched root and classifies every settled
//! filesystem add/change into one of three semantics: a new externally
//! dropped file, a file the organizer itself just moved (suppressed), or a
//! previously processed file a user moved back in (reported, never
//! reprocessed).
//!
//! Identity is tracked by basename and path strings, not inodes: the
//! organizer renames files, so the destination path never matches the
//! source. Two unrelated files sharing a basename inside the TTL windows
//! can be confused; that trade-off is inherited from the suppression design.

use crate::config::WatcherTimings;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Extensions this watcher acts on itself. Spreadsheets and images reach
/// the pipeline through other entry points, not this filter.
pub const WATCHED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

/// OS metadata files that never count as documents
const IGNORED_BASENAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// What happened on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Add,
    Change,
    Unlink,
}

/// A settled filesystem event for a watched document
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub file_name: String,
    pub extension: String,
    pub kind: FileEventKind,
}

/// High-level events emitted to the dispatcher
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// Initial scan finished and the watch is live
    Started { root: PathBuf, existing_files: usize },
    /// A new externally dropped file to process
    FileDetected(FileEvent),
    /// A previously processed file was moved back in by the user;
    /// informational only, never reprocessed
    FileMovedByUser { path: PathBuf, file_name: String },
    /// Watcher-level error; the watch keeps running
    Error(String),
    Stopped,
}

/// Classification of a settled add/change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Suppressed,
    ReturnedByUser,
    Detected,
}

/// Narrow interface the organizer uses to arm the self-move suppression
/// window
pub trait MoveTracker: Send + Sync {
    fn mark_file_as_moved(&self, original: &Path, new: &Path);
}

struct WatcherInner {
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    root: Option<PathBuf>,
    running: bool,
    /// Basename -> expiry; files recently processed by the pipeline
    processed_files: HashMap<String, Instant>,
    /// Identity string (both paths, both basenames) -> expiry; files the
    /// organizer just moved
    moved_files: HashMap<String, Instant>,
    timings: WatcherTimings,
}

impl WatcherInner {
    fn purge_expired(&mut self, now: Instant) {
        self.processed_files.retain(|_, expiry| *expiry > now);
        self.moved_files.retain(|_, expiry| *expiry > now);
    }

    /// The ordering here is the contract: self-move suppression wins over
    /// the returned-file check, which wins over detection.
    fn classify_at(&mut self, path: &Path, now: Instant) -> Classification {
        self.purge_expired(now);

        let path_key = path.to_string_lossy().to_string();
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if self.moved_files.contains_key(&path_key) || self.moved_files.contains_key(&basename) {
            return Classification::Suppressed;
        }

        if self.processed_files.contains_key(&basename) {
            return Classification::ReturnedByUser;
        }

        let ttl = Duration::from_secs(self.timings.processed_ttl_secs);
        self.processed_files.insert(basename, now + ttl);
        Classification::Detected
    }

    fn mark_moved_at(&mut self, original: &Path, new: &Path, now: Instant) {
        let expiry = now + Duration::from_secs(self.timings.moved_ttl_secs);

        let mut keys = vec![
            original.to_string_lossy().to_string(),
            new.to_string_lossy().to_string(),
        ];
        if let Some(name) = original.file_name() {
            keys.push(name.to_string_lossy().to_string());
        }
        if let Some(name) = new.file_name() {
            keys.push(name.to_string_lossy().to_string());
        }

        for key in keys {
            self.moved_files.insert(key, expiry);
        }
    }
}

/// Folder watcher handle; cheap to clone and share with the organizer
#[derive(Clone)]
pub struct FileWatcher {
    inner: Arc<Mutex<WatcherInner>>,
    events: mpsc::UnboundedSender<WatcherEvent>,
}

impl FileWatcher {
    /// Create a watcher and the receiving end of its event stream
    pub fn new(timings: WatcherTimings) -> (Self, mpsc::UnboundedReceiver<WatcherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            inner: Arc::new(Mutex::new(WatcherInner {
                debouncer: None,
                root: None,
                running: false,
                processed_files: HashMap::new(),
                moved_files: HashMap::new(),
                timings,
            })),
            events: tx,
        };
        (watcher, rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatcherInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!("[Watcher] state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn emit(&self, event: WatcherEvent) {
        let _ = self.events.send(event);
    }

    /// Start watching `root`. Fails fast on an empty path without touching
    /// watcher state; a second start while running is a no-op.
    pub fn start(&self, root: &Path) -> Result<(), String> {
        {
            let state = self.lock();
            if state.running {
                tracing::debug!("[Watcher] start ignored, already running");
                return Ok(());
            }
        }

        if root.as_os_str().is_empty() {
            let message = "Cannot start watcher: no folder configured".to_string();
            self.emit(WatcherEvent::Error(message.clone()));
            return Err(message);
        }

        // Count what is already there so the start event can report it; the
        // scan must finish before the watch goes live.
        let existing_files = walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| !should_ignore(entry.path(), Some(root)))
            .filter(|entry| has_watched_extension(entry.path()))
            .count();

        let settle = Duration::from_millis({
            let state = self.lock();
            state.timings.settle_ms
        });

        let handler = self.clone();
        let mut debouncer = new_debouncer(
            settle,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        handler.handle_debounced(&event);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        handler.handle_notify_error(&error);
                    }
                }
            },
        )
        .map_err(|e| format!("Failed to create watcher: {}", e))?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| format!("Failed to watch path: {}", e))?;

        {
            let mut state = self.lock();
            state.debouncer = Some(debouncer);
            state.root = Some(root.to_path_buf());
            state.running = true;
        }

        tracing::info!(
            "[Watcher] Watching {} ({} existing documents)",
            root.display(),
            existing_files
        );
        self.emit(WatcherEvent::Started {
            root: root.to_path_buf(),
            existing_files,
        });

        Ok(())
    }

    /// Stop watching and clear all tracking state. Idempotent.
    pub fn stop(&self) {
        // Drop the debouncer outside the lock: its shutdown joins the
        // notify thread, which may be waiting on this mutex.
        let (was_running, debouncer) = {
            let mut state = self.lock();
            let was_running = state.running;
            let debouncer = state.debouncer.take();
            state.root = None;
            state.running = false;
            state.processed_files.clear();
            state.moved_files.clear();
            (was_running, debouncer)
        };
        drop(debouncer);

        if was_running {
            tracing::info!("[Watcher] Stopped");
            self.emit(WatcherEvent::Stopped);
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Handle one settled debounced event from the notify thread
    fn handle_debounced(&self, event: &DebouncedEvent) {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Add,
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => FileEventKind::Change,
            EventKind::Remove(_) => FileEventKind::Unlink,
            _ => return,
        };

        // Removals only matter to the OS; the pipeline acts on arrivals
        if kind == FileEventKind::Unlink {
            return;
        }

        let root = self.lock().root.clone();

        for path in &event.paths {
            if path.is_dir() || path.is_symlink() || should_ignore(path, root.as_deref()) {
                continue;
            }

            if !has_watched_extension(path) {
                continue;
            }

            // Partially-written files show up as zero-length after settle
            match std::fs::symlink_metadata(path) {
                Ok(metadata) if metadata.len() > 0 => {}
                _ => continue,
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            let classification = self.lock().classify_at(path, Instant::now());

            match classification {
                Classification::Suppressed => {
                    tracing::debug!(
                        "[Watcher] Suppressed self-move event for {}",
                        path.display()
                    );
                }
                Classification::ReturnedByUser => {
                    tracing::info!("[Watcher] {} was moved back in by the user", file_name);
                    self.emit(WatcherEvent::FileMovedByUser {
                        path: path.clone(),
                        file_name,
                    });
                }
                Classification::Detected => {
                    tracing::info!("[Watcher] Detected new file {}", path.display());
                    self.emit(WatcherEvent::FileDetected(FileEvent {
                        path: path.clone(),
                        file_name,
                        extension,
                        kind,
                    }));
                }
            }
        }
    }

    /// Notify-level errors: create/delete races show up as EBADF/ENOENT and
    /// are non-critical; everything else is surfaced.
    fn handle_notify_error(&self, error: &notify::Error) {
        let message = error.to_string();
        let lowered = message.to_lowercase();

        let transient = lowered.contains("ebadf")
            || lowered.contains("bad file descriptor")
            || lowered.contains("enoent")
            || lowered.contains("no such file");

        if transient {
            tracing::warn!("[Watcher] Ignoring transient watch error: {}", message);
        } else {
            tracing::error!("[Watcher] {}", message);
            self.emit(WatcherEvent::Error(message));
        }
    }
}

impl MoveTracker for FileWatcher {
    /// Called by the organizer immediately after a successful rename, before
    /// the destination's filesystem event can settle.
    fn mark_file_as_moved(&self, original: &Path, new: &Path) {
        self.lock().mark_moved_at(original, new, Instant::now());
        tracing::debug!(
            "[Watcher] Armed move suppression: {} -> {}",
            original.display(),
            new.display()
        );
    }
}

/// Whether the path has one of the extensions this watcher filters on
fn has_watched_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| WATCHED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Dotfiles, VCS/build directories, OS metadata and device paths are never
/// documents. Components are judged relative to the watched root so a
/// dot-named root directory does not blank out the whole tree.
fn should_ignore(path: &Path, root: Option<&Path>) -> bool {
    if path.starts_with("/dev") {
        return true;
    }

    let relative = root
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);

    for component in relative.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.starts_with('.') && name != "." && name != ".." {
            return true;
        }
        if name == "node_modules" {
            return true;
        }
    }

    path.file_name()
        .map(|n| IGNORED_BASENAMES.contains(&n.to_string_lossy().as_ref()))
        .unwrap_or(false)
}
