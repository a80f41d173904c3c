//! Persistence manager for the processing log.

use crate::history::entry::{
    Correction, CorrectionField, CorrectionRecord, LogEntry, MAX_LOG_ENTRIES,
};
use crate::processor::ProcessingResult;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Log filename inside the app config directory
const LOG_FILENAME: &str = "log.json";

/// Append-capped store of processing results.
///
/// The log is the user-facing record of what the pipeline did and the
/// source of the "already processed" query that stops rename churn when an
/// organized file is dropped back into the watched tree.
pub struct LogStore {
    log_path: PathBuf,
}

impl LogStore {
    /// Create a store at the default platform location
    pub fn new() -> Result<Self, String> {
        let dir = dirs::config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?
            .join("parafile");
        Ok(Self::with_dir(dir))
    }

    /// Create a store rooted at an explicit directory (used by tests)
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            log_path: dir.join(LOG_FILENAME),
        }
    }

    /// Load all entries, most recent last. Missing or unparseable files
    /// yield an empty log.
    pub fn load(&self) -> Vec<LogEntry> {
        match File::open(&self.log_path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader(reader) {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::warn!(
                            "[Log] Failed to parse {}: {}. Starting empty.",
                            self.log_path.display(),
                            e
                        );
                        Vec::new()
                    }
                }
            }
            Err(_) => Vec::new(),
        }
    }

    /// Atomically write the log, trimming to the most recent
    /// `MAX_LOG_ENTRIES`.
    fn save(&self, entries: &mut Vec<LogEntry>) -> Result<(), String> {
        if entries.len() > MAX_LOG_ENTRIES {
            let excess = entries.len() - MAX_LOG_ENTRIES;
            entries.drain(..excess);
        }

        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let temp_path = self.log_path.with_extension("tmp");

        let file = File::create(&temp_path)
            .map_err(|e| format!("Failed to create temp file: {}", e))?;

        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, entries)
            .map_err(|e| format!("Failed to serialize log: {}", e))?;

        writer.flush().map_err(|e| format!("Failed to flush: {}", e))?;

        writer
            .get_ref()
            .sync_all()
            .map_err(|e| format!("Failed to sync: {}", e))?;

        fs::rename(&temp_path, &self.log_path)
            .map_err(|e| format!("Failed to rename: {}", e))?;

        Ok(())
    }

    /// Append a pipeline result to the log
    pub fn add_entry(&self, result: &ProcessingResult) -> Result<LogEntry, String> {
        let entry = LogEntry {
            id: LogEntry::generate_id(),
            timestamp: Utc::now(),
            original_name: result.file_name.clone(),
            parafile_name: result.new_name.clone(),
            category: result.category.clone(),
            reasoning: result.reasoning.clone().unwrap_or_default(),
            success: result.success,
            corrected: false,
            corrections: Vec::new(),
        };

        let mut entries = self.load();
        entries.push(entry.clone());
        self.save(&mut entries)?;

        Ok(entry)
    }

    /// Whether `file_name` was previously the successful output name of a
    /// pipeline run. Used to skip renaming when a user drops an organized
    /// file back in.
    pub fn is_file_already_processed(&self, file_name: &str) -> bool {
        self.load()
            .iter()
            .any(|entry| entry.success && entry.parafile_name == file_name)
    }

    /// Apply a user correction to an entry: update the displayed field in
    /// place, append an audit record and mark the entry corrected. Returns
    /// the updated entry, or `None` when the id is unknown.
    pub fn add_correction(
        &self,
        entry_id: &str,
        correction: Correction,
    ) -> Result<Option<LogEntry>, String> {
        let mut entries = self.load();

        let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(None);
        };

        let from = match correction.field {
            CorrectionField::Category => {
                std::mem::replace(&mut entry.category, correction.new_value.clone())
            }
            CorrectionField::ParafileName => {
                std::mem::replace(&mut entry.parafile_name, correction.new_value.clone())
            }
        };

        entry.corrected = true;
        entry.corrections.push(CorrectionRecord {
            timestamp: Utc::now(),
            field: correction.field,
            from,
            to: correction.new_value,
            feedback: correction.feedback,
        });

        let updated = entry.clone();
        self.save(&mut entries)?;

        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{ProcessingResult, TokenUsage};
    use tempfile::TempDir;

    fn result(file_name: &str, new_name: &str, success: bool) -> ProcessingResult {
        ProcessingResult {
            file_path: format!("/watched/{}", file_name),
            file_name: file_name.to_string(),
            success,
            error: None,
            processing_step: None,
            category: "General".to_string(),
            new_name: new_name.to_string(),
            new_path: None,
            confidence: Some(0.9),
            reasoning: Some("looks general".to_string()),
            processing_time: 12,
            token_usage: TokenUsage::default(),
        }
    }

    #[test]
    fn test_add_entry_and_already_processed() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::with_dir(dir.path().to_path_buf());

        store.add_entry(&result("scan001.pdf", "invoice-acme.pdf", true)).unwrap();
        store.add_entry(&result("fail.pdf", "fail.pdf", false)).unwrap();

        assert!(store.is_file_already_processed("invoice-acme.pdf"));
        // Failed runs never count as processed output names
        assert!(!store.is_file_already_processed("fail.pdf"));
        assert!(!store.is_file_already_processed("scan001.pdf"));
    }

    #[test]
    fn test_log_is_capped() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::with_dir(dir.path().to_path_buf());

        for i in 0..(MAX_LOG_ENTRIES + 20) {
            store
                .add_entry(&result(&format!("f{}.pdf", i), &format!("out{}.pdf", i), true))
                .unwrap();
        }

        let entries = store.load();
        assert_eq!(entries.len(), MAX_LOG_ENTRIES);
        // The oldest entries were dropped
        assert_eq!(entries[0].original_name, "f20.pdf");
    }

    #[test]
    fn test_correction_mutates_in_place_with_audit() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::with_dir(dir.path().to_path_buf());

        let entry = store.add_entry(&result("a.pdf", "a-renamed.pdf", true)).unwrap();

        let updated = store
            .add_correction(
                &entry.id,
                Correction {
                    field: CorrectionField::Category,
                    new_value: "Invoices".to_string(),
                    feedback: Some("this is clearly an invoice".to_string()),
                },
            )
            .unwrap()
            .expect("entry should exist");

        assert_eq!(updated.category, "Invoices");
        assert!(updated.corrected);
        assert_eq!(updated.corrections.len(), 1);
        assert_eq!(updated.corrections[0].from, "General");
        assert_eq!(updated.corrections[0].to, "Invoices");

        let missing = store
            .add_correction(
                "no-such-id",
                Correction {
                    field: CorrectionField::ParafileName,
                    new_value: "x.pdf".to_string(),
                    feedback: None,
                },
            )
            .unwrap();
        assert!(missing.is_none());
    }
}
