//! Data structures for the processing log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of log entries retained on save
pub const MAX_LOG_ENTRIES: usize = 100;

/// Which displayed field a correction changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionField {
    Category,
    ParafileName,
}

/// Audit record appended when a user corrects an entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRecord {
    pub timestamp: DateTime<Utc>,
    pub field: CorrectionField,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// One processed file, as shown to the user.
///
/// Corrections mutate `parafile_name`/`category` in place so the displayed
/// entry reflects the user's fix, while `corrections` keeps the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Time-plus-random id, unique within the log
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_name: String,
    /// The name the pipeline gave the file (post-correction if corrected)
    pub parafile_name: String,
    pub category: String,
    pub reasoning: String,
    pub success: bool,
    #[serde(default)]
    pub corrected: bool,
    #[serde(default)]
    pub corrections: Vec<CorrectionRecord>,
}

impl LogEntry {
    /// Generate a time-prefixed unique id
    pub fn generate_id() -> String {
        let millis = Utc::now().timestamp_millis();
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", millis, &random[..8])
    }
}

/// A user correction applied to an existing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub field: CorrectionField,
    pub new_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = LogEntry::generate_id();
        let b = LogEntry::generate_id();
        assert_ne!(a, b);
    }
}
