//! Data structures for the correction feedback document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cap on category corrections returned in a relevance bundle. These caps
/// bound the text injected into AI prompts.
pub const MAX_RELEVANT_CATEGORY_CORRECTIONS: usize = 10;

/// Cap on name corrections returned in a relevance bundle
pub const MAX_RELEVANT_NAME_CORRECTIONS: usize = 5;

/// Minimum pattern count before it is considered relevant for prompting
pub const MIN_RELEVANT_PATTERN_COUNT: u32 = 2;

/// Minimum pattern count before it is surfaced as a common mistake
pub const MIN_COMMON_MISTAKE_COUNT: u32 = 3;

/// One user correction as reported by the log/UI collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInput {
    /// Free-text reason for a category correction, if the user gave one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_feedback: Option<String>,
    /// Free-text reason for a name correction, if the user gave one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_feedback: Option<String>,
    pub original_category: String,
    pub new_category: String,
    /// The file's name as originally dropped
    pub original_name: String,
    /// The name the pipeline produced
    pub original_parafile_name: String,
    /// The name the user corrected it to
    pub new_name: String,
    /// The pipeline's reasoning at the time of the original decision
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

/// Recorded category correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCorrection {
    pub original_category: String,
    pub new_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub original_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Recorded filename correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCorrection {
    pub original_parafile_name: String,
    pub new_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub original_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate for one ordered `<from>_to_<to>` category pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionPattern {
    pub count: u32,
    /// Filenames that exhibited this correction
    pub examples: Vec<String>,
    /// Free-text reasons users gave
    pub common_feedback: Vec<String>,
    /// When this pattern last occurred; orders patterns by recency
    pub last_seen: DateTime<Utc>,
}

/// The persisted feedback document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDocument {
    #[serde(default)]
    pub category_corrections: Vec<CategoryCorrection>,
    #[serde(default)]
    pub name_corrections: Vec<NameCorrection>,
    /// Keyed by `<fromCategory>_to_<toCategory>`
    #[serde(default)]
    pub patterns: HashMap<String, CorrectionPattern>,
}

/// Pattern key for an ordered category pair
pub fn pattern_key(from: &str, to: &str) -> String {
    format!("{}_to_{}", from, to)
}

/// A correction reduced for prompt injection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionSummary {
    pub was: String,
    pub corrected_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub because: Option<String>,
}

/// A recurring pattern relevant to the category currently under
/// consideration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantPattern {
    pub from: String,
    pub to: String,
    pub count: u32,
    pub examples: Vec<String>,
    pub common_feedback: Vec<String>,
}

/// Bounded context bundle injected into AI prompts
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantFeedback {
    pub patterns: Vec<RelevantPattern>,
    pub category_corrections: Vec<CorrectionSummary>,
    pub name_corrections: Vec<CorrectionSummary>,
}

impl RelevantFeedback {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.category_corrections.is_empty()
            && self.name_corrections.is_empty()
    }

    /// Render the bundle as prompt context. Caps on the source lists keep
    /// this bounded.
    pub fn to_prompt_context(&self) -> String {
        let mut out = String::new();

        if !self.patterns.is_empty() {
            out.push_str("Recurring corrections for this category:\n");
            for p in &self.patterns {
                out.push_str(&format!(
                    "- Files first classified as '{}' were moved to '{}' {} times (e.g. {})\n",
                    p.from,
                    p.to,
                    p.count,
                    p.examples.join(", ")
                ));
                for reason in &p.common_feedback {
                    out.push_str(&format!("  reason given: {}\n", reason));
                }
            }
        }

        if !self.category_corrections.is_empty() {
            out.push_str("Recent category corrections:\n");
            for c in &self.category_corrections {
                out.push_str(&format!("- '{}' -> '{}'", c.was, c.corrected_to));
                if let Some(because) = &c.because {
                    out.push_str(&format!(" because: {}", because));
                }
                out.push('\n');
            }
        }

        if !self.name_corrections.is_empty() {
            out.push_str("Recent filename corrections:\n");
            for c in &self.name_corrections {
                out.push_str(&format!("- '{}' -> '{}'", c.was, c.corrected_to));
                if let Some(because) = &c.because {
                    out.push_str(&format!(" because: {}", because));
                }
                out.push('\n');
            }
        }

        out
    }
}

/// Correction-target histogram for one category
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCorrectionStats {
    pub category: String,
    pub corrections: u32,
    /// How often each target category was chosen instead
    pub targets: HashMap<String, u32>,
}

/// A pattern frequent enough to call a mistake
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonMistake {
    pub from: String,
    pub to: String,
    pub count: u32,
    /// Up to three example filenames
    pub examples: Vec<String>,
}

/// Offline diagnostic aggregate over the whole document
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAnalysis {
    pub most_corrected_categories: Vec<CategoryCorrectionStats>,
    pub common_mistakes: Vec<CommonMistake>,
}
