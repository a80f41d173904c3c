//! File organizer
//!
//! Resolves the target directory and filename for a processed document,
//! probes out naming conflicts and performs the move. After a successful
//! rename it arms the watcher's self-move suppression window through the
//! [`MoveTracker`] interface, before the destination's filesystem event can
//! settle.

use crate::config::AppConfig;
use crate::watcher::MoveTracker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Organizer failures. These abort the pipeline for the affected file; the
/// source file is left untouched.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("source file not found: {0}")]
    SourceMissing(String),
    #[error("failed to create category directory {0}: {1}")]
    CreateDir(String, String),
    #[error("failed to move file to {0}: {1}")]
    Move(String, String),
}

/// Outcome of a successful organize step
#[derive(Debug, Clone)]
pub struct OrganizedFile {
    pub new_path: PathBuf,
    pub new_name: String,
    /// True when source and target were already the same file and no
    /// filesystem operation was performed
    pub skipped: bool,
}

/// Moves processed files into place
pub struct FileOrganizer {
    tracker: Arc<dyn MoveTracker>,
}

impl FileOrganizer {
    pub fn new(tracker: Arc<dyn MoveTracker>) -> Self {
        Self { tracker }
    }

    /// Move `file_path` to its organized location.
    ///
    /// With organization enabled the target directory is
    /// `watched_folder/<category>` (created on demand); otherwise the file
    /// stays in its current directory. `skip_rename` keeps the current
    /// filename and only relocates the file.
    pub fn process_file(
        &self,
        file_path: &Path,
        category_name: &str,
        desired_base_name: &str,
        config: &AppConfig,
        skip_rename: bool,
    ) -> Result<OrganizedFile, OrganizeError> {
        if !file_path.exists() {
            return Err(OrganizeError::SourceMissing(
                file_path.display().to_string(),
            ));
        }

        let target_dir = if config.enable_organization {
            let dir = Path::new(&config.watched_folder).join(category_name);
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    OrganizeError::CreateDir(dir.display().to_string(), e.to_string())
                })?;
            }
            dir
        } else {
            file_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };

        let current_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let target_name = if skip_rename {
            current_name.clone()
        } else {
            let extension = file_path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            format!("{}{}", desired_base_name, extension)
        };

        let target_path = unique_target_path(file_path, &target_dir, &target_name);

        // Re-targeting onto yourself is not a move
        if is_same_file(file_path, &target_path) {
            tracing::debug!(
                "[Organizer] {} already in place, skipping",
                file_path.display()
            );
            return Ok(OrganizedFile {
                new_name: target_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or(target_name),
                new_path: target_path,
                skipped: true,
            });
        }

        std::fs::rename(file_path, &target_path).map_err(|e| {
            OrganizeError::Move(target_path.display().to_string(), e.to_string())
        })?;

        // Arm the suppression window before the destination event settles
        self.tracker.mark_file_as_moved(file_path, &target_path);

        tracing::info!(
            "[Organizer] Moved {} -> {}",
            file_path.display(),
            target_path.display()
        );

        Ok(OrganizedFile {
            new_name: target_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or(target_name),
            new_path: target_path,
            skipped: false,
        })
    }
}

/// Probe `name`, `name_1`, `name_2`, ... until an unused path is found. A
/// path occupied by the source file itself counts as available.
///
/// The probe-then-rename sequence is not atomic: two concurrent pipelines
/// targeting the same name can race between the probe and the move. Accepted
/// limitation.
fn unique_target_path(source: &Path, target_dir: &Path, target_name: &str) -> PathBuf {
    let candidate = target_dir.join(target_name);
    if !candidate.exists() || is_same_file(source, &candidate) {
        return candidate;
    }

    let (stem, extension) = match target_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (target_name.to_string(), String::new()),
    };

    let mut counter = 1;
    loop {
        let candidate = target_dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() || is_same_file(source, &candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Whether two paths resolve to the same file on disk
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records mark_file_as_moved calls instead of touching a real watcher
    #[derive(Default)]
    struct RecordingTracker {
        moves: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl MoveTracker for RecordingTracker {
        fn mark_file_as_moved(&self, original: &Path, new: &Path) {
            self.moves
                .lock()
                .unwrap()
                .push((original.to_path_buf(), new.to_path_buf()));
        }
    }

    fn config(dir: &TempDir, organize: bool) -> AppConfig {
        AppConfig {
            watched_folder: dir.path().to_string_lossy().to_string(),
            enable_organization: organize,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_same_target_is_skipped_without_io() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("report.pdf");
        std::fs::write(&file, b"content").unwrap();

        let tracker = Arc::new(RecordingTracker::default());
        let organizer = FileOrganizer::new(tracker.clone());

        let result = organizer
            .process_file(&file, "General", "report", &config(&dir, false), false)
            .unwrap();

        assert!(result.skipped);
        assert_eq!(result.new_name, "report.pdf");
        assert!(file.exists());
        // No move happened, so the watcher was not notified
        assert!(tracker.moves.lock().unwrap().is_empty());
    }

    #[test]
    fn test_move_into_category_notifies_tracker() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan001.pdf");
        std::fs::write(&file, b"content").unwrap();

        let tracker = Arc::new(RecordingTracker::default());
        let organizer = FileOrganizer::new(tracker.clone());

        let result = organizer
            .process_file(&file, "Invoices", "invoice-acme", &config(&dir, true), false)
            .unwrap();

        assert!(!result.skipped);
        assert_eq!(result.new_name, "invoice-acme.pdf");
        assert_eq!(result.new_path, dir.path().join("Invoices").join("invoice-acme.pdf"));
        assert!(result.new_path.exists());
        assert!(!file.exists());

        let moves = tracker.moves.lock().unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, file);
        assert_eq!(moves[0].1, result.new_path);
    }

    #[test]
    fn test_conflicting_names_get_numeric_suffixes() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.pdf");
        let second = dir.path().join("b.pdf");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();

        let organizer = FileOrganizer::new(Arc::new(RecordingTracker::default()));
        let cfg = config(&dir, true);

        let first_result = organizer
            .process_file(&first, "Reports", "annual-report", &cfg, false)
            .unwrap();
        let second_result = organizer
            .process_file(&second, "Reports", "annual-report", &cfg, false)
            .unwrap();

        assert_eq!(first_result.new_name, "annual-report.pdf");
        assert_eq!(second_result.new_name, "annual-report_1.pdf");
        assert!(first_result.new_path.exists());
        assert!(second_result.new_path.exists());
    }

    #[test]
    fn test_skip_rename_relocates_under_current_name() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("invoice-acme.pdf");
        std::fs::write(&file, b"content").unwrap();

        let organizer = FileOrganizer::new(Arc::new(RecordingTracker::default()));

        let result = organizer
            .process_file(&file, "Invoices", "ignored-name", &config(&dir, true), true)
            .unwrap();

        assert_eq!(result.new_name, "invoice-acme.pdf");
        assert_eq!(result.new_path, dir.path().join("Invoices").join("invoice-acme.pdf"));
    }

    #[test]
    fn test_missing_source_is_structured_failure() {
        let dir = TempDir::new().unwrap();
        let organizer = FileOrganizer::new(Arc::new(RecordingTracker::default()));

        let result = organizer.process_file(
            &dir.path().join("ghost.pdf"),
            "General",
            "ghost",
            &config(&dir, false),
            false,
        );

        assert!(matches!(result, Err(OrganizeError::SourceMissing(_))));
    }

    #[test]
    fn test_rename_in_place_when_organization_disabled() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan001.pdf");
        std::fs::write(&file, b"content").unwrap();

        let organizer = FileOrganizer::new(Arc::new(RecordingTracker::default()));

        let result = organizer
            .process_file(&file, "Invoices", "invoice-acme", &config(&dir, false), false)
            .unwrap();

        assert!(!result.skipped);
        assert_eq!(result.new_path, dir.path().join("invoice-acme.pdf"));
        assert!(!file.exists());
    }
}
