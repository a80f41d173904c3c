//! Persistence and queries for the correction feedback document.

use super::entry::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Feedback document filename inside the app config directory
const FEEDBACK_FILENAME: &str = "feedback.json";

/// Stores correction history and answers relevance queries.
///
/// Owns a single JSON document on disk; every mutation is a load-modify-save
/// with an atomic write, so concurrent readers never observe a torn file.
pub struct FeedbackStore {
    feedback_path: PathBuf,
}

impl FeedbackStore {
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
            feedback_path: dir.join(FEEDBACK_FILENAME),
        }
    }

    /// Load the document; missing or unparseable files yield an empty one
    pub fn load(&self) -> FeedbackDocument {
        match File::open(&self.feedback_path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader(reader) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::warn!(
                            "[Feedback] Failed to parse {}: {}. Starting empty.",
                            self.feedback_path.display(),
                            e
                        );
                        FeedbackDocument::default()
                    }
                }
            }
            Err(_) => FeedbackDocument::default(),
        }
    }

    /// Atomically write the document to disk
    fn save(&self, doc: &FeedbackDocument) -> Result<(), String> {
        if let Some(parent) = self.feedback_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let temp_path = self.feedback_path.with_extension("tmp");

        let file = File::create(&temp_path)
            .map_err(|e| format!("Failed to create temp file: {}", e))?;

        let mut writer = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut writer, doc)
            .map_err(|e| format!("Failed to serialize feedback: {}", e))?;

        writer.flush().map_err(|e| format!("Failed to flush: {}", e))?;

        writer
            .get_ref()
            .sync_all()
            .map_err(|e| format!("Failed to sync: {}", e))?;

        fs::rename(&temp_path, &self.feedback_path)
            .map_err(|e| format!("Failed to rename: {}", e))?;

        Ok(())
    }

    /// Record a user correction: appends to the correction lists and updates
    /// the `<from>_to_<to>` pattern aggregate.
    pub fn store_feedback(&self, input: FeedbackInput) -> Result<(), String> {
        let mut doc = self.load();

        let category_changed = input.original_category != input.new_category;
        if category_changed || input.category_feedback.is_some() {
            doc.category_corrections.push(CategoryCorrection {
                original_category: input.original_category.clone(),
                new_category: input.new_category.clone(),
                feedback: input.category_feedback.clone(),
                original_name: input.original_name.clone(),
                timestamp: input.timestamp,
            });
        }

        let name_changed = input.original_parafile_name != input.new_name;
        if name_changed || input.name_feedback.is_some() {
            doc.name_corrections.push(NameCorrection {
                original_parafile_name: input.original_parafile_name.clone(),
                new_name: input.new_name.clone(),
                feedback: input.name_feedback.clone(),
                original_name: input.original_name.clone(),
                timestamp: input.timestamp,
            });
        }

        if category_changed {
            let key = pattern_key(&input.original_category, &input.new_category);
            let pattern = doc.patterns.entry(key).or_insert_with(|| CorrectionPattern {
                count: 0,
                examples: Vec::new(),
                common_feedback: Vec::new(),
                last_seen: input.timestamp,
            });
            pattern.count += 1;
            pattern.examples.push(input.original_name.clone());
            if let Some(feedback) = &input.category_feedback {
                pattern.common_feedback.push(feedback.clone());
            }
            pattern.last_seen = input.timestamp;
        }

        self.save(&doc)?;

        tracing::info!(
            "[Feedback] Recorded correction for '{}' ({} -> {})",
            input.original_name,
            input.original_category,
            input.new_category
        );

        Ok(())
    }

    /// Build the bounded context bundle for a categorization or extraction
    /// prompt.
    ///
    /// Patterns are included when they start at `current_category` and have
    /// recurred at least twice, ranked by recency. The correction lists are
    /// hard-capped (10 category / 5 name) so the prompt stays bounded no
    /// matter how large the document grows. `document_text` is part of the
    /// query contract but unused by the current ranking.
    pub fn get_relevant_feedback(
        &self,
        _document_text: &str,
        current_category: &str,
    ) -> RelevantFeedback {
        let doc = self.load();

        let mut patterns: Vec<(String, CorrectionPattern)> = doc
            .patterns
            .into_iter()
            .filter(|(key, pattern)| {
                pattern.count >= MIN_RELEVANT_PATTERN_COUNT
                    && key.starts_with(&format!("{}_to_", current_category))
            })
            .collect();
        patterns.sort_by(|a, b| {
            b.1.last_seen
                .cmp(&a.1.last_seen)
                .then(b.1.count.cmp(&a.1.count))
        });

        let relevant_patterns = patterns
            .into_iter()
            .filter_map(|(key, pattern)| {
                let to = key
                    .strip_prefix(&format!("{}_to_", current_category))?
                    .to_string();
                Some(RelevantPattern {
                    from: current_category.to_string(),
                    to,
                    count: pattern.count,
                    examples: pattern.examples,
                    common_feedback: pattern.common_feedback,
                })
            })
            .collect();

        let category_corrections = doc
            .category_corrections
            .iter()
            .rev()
            .take(MAX_RELEVANT_CATEGORY_CORRECTIONS)
            .map(|c| CorrectionSummary {
                was: c.original_category.clone(),
                corrected_to: c.new_category.clone(),
                because: c.feedback.clone(),
            })
            .collect();

        let name_corrections = doc
            .name_corrections
            .iter()
            .rev()
            .take(MAX_RELEVANT_NAME_CORRECTIONS)
            .map(|c| CorrectionSummary {
                was: c.original_parafile_name.clone(),
                corrected_to: c.new_name.clone(),
                because: c.feedback.clone(),
            })
            .collect();

        RelevantFeedback {
            patterns: relevant_patterns,
            category_corrections,
            name_corrections,
        }
    }

    /// Offline diagnostic: which categories get corrected most, where those
    /// corrections land, and which patterns recur often enough to call
    /// mistakes.
    pub fn analyze_feedback_patterns(&self) -> FeedbackAnalysis {
        let doc = self.load();

        let mut per_category: HashMap<String, CategoryCorrectionStats> = HashMap::new();
        for correction in &doc.category_corrections {
            let stats = per_category
                .entry(correction.original_category.clone())
                .or_insert_with(|| CategoryCorrectionStats {
                    category: correction.original_category.clone(),
                    corrections: 0,
                    targets: HashMap::new(),
                });
            stats.corrections += 1;
            *stats
                .targets
                .entry(correction.new_category.clone())
                .or_insert(0) += 1;
        }

        let mut most_corrected: Vec<CategoryCorrectionStats> =
            per_category.into_values().collect();
        most_corrected.sort_by(|a, b| b.corrections.cmp(&a.corrections));

        let mut common_mistakes: Vec<CommonMistake> = doc
            .patterns
            .iter()
            .filter(|(_, p)| p.count >= MIN_COMMON_MISTAKE_COUNT)
            .filter_map(|(key, p)| {
                let (from, to) = key.split_once("_to_")?;
                Some(CommonMistake {
                    from: from.to_string(),
                    to: to.to_string(),
                    count: p.count,
                    examples: p.examples.iter().rev().take(3).cloned().collect(),
                })
            })
            .collect();
        common_mistakes.sort_by(|a, b| b.count.cmp(&a.count));

        FeedbackAnalysis {
            most_corrected_categories: most_corrected,
            common_mistakes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn input(from: &str, to: &str, name: &str, feedback: Option<&str>) -> FeedbackInput {
        FeedbackInput {
            category_feedback: feedback.map(|s| s.to_string()),
            name_feedback: None,
            original_category: from.to_string(),
            new_category: to.to_string(),
            original_name: name.to_string(),
            original_parafile_name: name.to_string(),
            new_name: name.to_string(),
            reasoning: "initial classification".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_store_feedback_updates_pattern_aggregate() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::with_dir(dir.path().to_path_buf());

        store
            .store_feedback(input("General", "Invoices", "acme.pdf", Some("it has a total")))
            .unwrap();
        store
            .store_feedback(input("General", "Invoices", "globex.pdf", None))
            .unwrap();

        let doc = store.load();
        assert_eq!(doc.category_corrections.len(), 2);
        let pattern = doc.patterns.get("General_to_Invoices").unwrap();
        assert_eq!(pattern.count, 2);
        assert_eq!(pattern.examples, vec!["acme.pdf", "globex.pdf"]);
        assert_eq!(pattern.common_feedback, vec!["it has a total"]);
    }

    #[test]
    fn test_relevant_feedback_requires_pattern_count() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::with_dir(dir.path().to_path_buf());

        store
            .store_feedback(input("General", "Invoices", "one.pdf", None))
            .unwrap();

        // A single occurrence is not a pattern yet
        let relevant = store.get_relevant_feedback("some text", "General");
        assert!(relevant.patterns.is_empty());
        assert_eq!(relevant.category_corrections.len(), 1);

        store
            .store_feedback(input("General", "Invoices", "two.pdf", None))
            .unwrap();

        let relevant = store.get_relevant_feedback("some text", "General");
        assert_eq!(relevant.patterns.len(), 1);
        assert_eq!(relevant.patterns[0].to, "Invoices");
        assert_eq!(relevant.patterns[0].count, 2);
    }

    #[test]
    fn test_relevant_feedback_filters_by_source_category() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::with_dir(dir.path().to_path_buf());

        for name in ["a.pdf", "b.pdf"] {
            store
                .store_feedback(input("Receipts", "Invoices", name, None))
                .unwrap();
        }

        let relevant = store.get_relevant_feedback("", "General");
        assert!(relevant.patterns.is_empty());

        let relevant = store.get_relevant_feedback("", "Receipts");
        assert_eq!(relevant.patterns.len(), 1);
    }

    #[test]
    fn test_relevant_feedback_caps_correction_lists() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::with_dir(dir.path().to_path_buf());

        for i in 0..15i64 {
            let mut item = input("General", "Invoices", &format!("f{}.pdf", i), None);
            item.original_parafile_name = format!("f{}.pdf", i);
            item.new_name = format!("renamed-{}.pdf", i);
            item.timestamp = Utc::now() + Duration::seconds(i);
            store.store_feedback(item).unwrap();
        }

        let relevant = store.get_relevant_feedback("", "General");
        assert_eq!(relevant.category_corrections.len(), 10);
        assert_eq!(relevant.name_corrections.len(), 5);
        // Most recent first
        assert_eq!(relevant.category_corrections[0].was, "General");
        assert_eq!(relevant.name_corrections[0].corrected_to, "renamed-14.pdf");
    }

    #[test]
    fn test_analyze_feedback_patterns() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::with_dir(dir.path().to_path_buf());

        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            store
                .store_feedback(input("General", "Invoices", name, None))
                .unwrap();
        }
        store
            .store_feedback(input("General", "Receipts", "d.pdf", None))
            .unwrap();

        let analysis = store.analyze_feedback_patterns();
        assert_eq!(analysis.most_corrected_categories[0].category, "General");
        assert_eq!(analysis.most_corrected_categories[0].corrections, 4);
        assert_eq!(analysis.common_mistakes.len(), 1);
        assert_eq!(analysis.common_mistakes[0].to, "Invoices");
        assert_eq!(analysis.common_mistakes[0].examples.len(), 3);
    }

    #[test]
    fn test_name_only_correction_skips_pattern() {
        let dir = TempDir::new().unwrap();
        let store = FeedbackStore::with_dir(dir.path().to_path_buf());

        let mut item = input("Invoices", "Invoices", "a.pdf", None);
        item.new_name = "invoice-acme.pdf".to_string();
        item.name_feedback = Some("use the vendor name".to_string());
        store.store_feedback(item).unwrap();

        let doc = store.load();
        assert!(doc.patterns.is_empty());
        assert!(doc.category_corrections.is_empty());
        assert_eq!(doc.name_corrections.len(), 1);
    }
}
