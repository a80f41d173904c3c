//! Document processor
//!
//! Drives one file through extraction, categorization, naming and
//! organization. Stages are strictly sequential; each carries its own
//! retry/fallback policy:
//!
//! - extraction: bounded lock-retry inside the gateway, then fatal
//! - categorization / variable extraction: never fatal, degrade to defaults
//! - organization: fatal for this file
//!
//! No failure here ever affects the watcher or another in-flight file, and
//! every run produces a result record.

use crate::ai::{Categorization, Categorizer, TokenCharge};
use crate::config::{AppConfig, Category, ConfigStore, GENERAL_CATEGORY, ORIGINAL_NAME_VARIABLE};
use crate::extraction::{ExtractionError, TextExtractor};
use crate::feedback::FeedbackStore;
use crate::history::LogStore;
use crate::naming;
use crate::organizer::{FileOrganizer, OrganizeError, OrganizedFile};
use crate::watcher::FileEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    TextExtraction,
    AiCategorization,
    VariableExtraction,
    FileAccess,
    FileOrganization,
    Unknown,
}

/// Fatal pipeline errors. AI failures never appear here; they degrade
/// inside the categorization gateway.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("document produced no text to categorize")]
    EmptyText,
    #[error("configuration error: the General category is missing")]
    MissingGeneralCategory,
    #[error("file organization failed: {0}")]
    Organize(#[from] OrganizeError),
}

impl ProcessorError {
    /// Best-effort attribution of a failure to a pipeline stage
    pub fn step(&self) -> ProcessingStep {
        match self {
            ProcessorError::Extraction(ExtractionError::Io(_)) => ProcessingStep::FileAccess,
            ProcessorError::Extraction(_) => ProcessingStep::TextExtraction,
            ProcessorError::EmptyText => ProcessingStep::TextExtraction,
            ProcessorError::MissingGeneralCategory => ProcessingStep::Unknown,
            ProcessorError::Organize(_) => ProcessingStep::FileOrganization,
        }
    }
}

/// Aggregated AI spend for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub total_tokens: u32,
    pub total_cost: f64,
    pub operations: Vec<TokenCharge>,
}

impl TokenUsage {
    pub fn add(&mut self, charge: TokenCharge) {
        self.total_tokens += charge.tokens;
        self.total_cost += charge.cost;
        self.operations.push(charge);
    }
}

/// Result record for one processed file, consumed by the log and
/// notification collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub file_path: String,
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_step: Option<ProcessingStep>,
    pub category: String,
    pub new_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Wall clock from pipeline entry, milliseconds
    pub processing_time: u64,
    pub token_usage: TokenUsage,
}

/// The already-processed query the pipeline needs from the log collaborator
pub trait ProcessingLog: Send + Sync {
    fn is_file_already_processed(&self, file_name: &str) -> bool;
}

impl ProcessingLog for LogStore {
    fn is_file_already_processed(&self, file_name: &str) -> bool {
        LogStore::is_file_already_processed(self, file_name)
    }
}

/// Per-file pipeline orchestrator
pub struct DocumentProcessor {
    config: ConfigStore,
    extractor: TextExtractor,
    categorizer: Categorizer,
    feedback: FeedbackStore,
    log: Arc<dyn ProcessingLog>,
    organizer: FileOrganizer,
}

impl DocumentProcessor {
    pub fn new(
        config: ConfigStore,
        extractor: TextExtractor,
        categorizer: Categorizer,
        feedback: FeedbackStore,
        log: Arc<dyn ProcessingLog>,
        organizer: FileOrganizer,
    ) -> Self {
        Self {
            config,
            extractor,
            categorizer,
            feedback,
            log,
            organizer,
        }
    }

    /// Run the full pipeline for one detected file. Never panics and never
    /// returns early without a result record.
    pub async fn process_document(&self, event: &FileEvent) -> ProcessingResult {
        let started = Instant::now();
        let config = self.config.load();

        let mut usage = TokenUsage::default();
        let mut category_name = GENERAL_CATEGORY.to_string();
        let mut confidence = None;
        let mut reasoning = None;

        let outcome = self
            .run_pipeline(
                event,
                &config,
                &mut usage,
                &mut category_name,
                &mut confidence,
                &mut reasoning,
            )
            .await;

        let processing_time = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(organized) => {
                tracing::info!(
                    "[Processor] {} -> {} ({}) in {}ms",
                    event.file_name,
                    organized.new_name,
                    category_name,
                    processing_time
                );
                ProcessingResult {
                    file_path: event.path.to_string_lossy().to_string(),
                    file_name: event.file_name.clone(),
                    success: true,
                    error: None,
                    processing_step: None,
                    category: category_name,
                    new_name: organized.new_name,
                    new_path: Some(organized.new_path.to_string_lossy().to_string()),
                    confidence,
                    reasoning,
                    processing_time,
                    token_usage: usage,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[Processor] {} failed after {}ms: {}",
                    event.file_name,
                    processing_time,
                    e
                );
                ProcessingResult {
                    file_path: event.path.to_string_lossy().to_string(),
                    file_name: event.file_name.clone(),
                    success: false,
                    error: Some(e.to_string()),
                    processing_step: Some(e.step()),
                    category: category_name,
                    new_name: event.file_name.clone(),
                    new_path: None,
                    confidence,
                    reasoning,
                    processing_time,
                    token_usage: usage,
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        event: &FileEvent,
        config: &AppConfig,
        usage: &mut TokenUsage,
        category_name: &mut String,
        confidence: &mut Option<f32>,
        reasoning: &mut Option<String>,
    ) -> Result<OrganizedFile, ProcessorError> {
        // A file whose name was already a successful output keeps that name;
        // renaming it again would churn forever on every re-drop.
        let skip_rename = self.log.is_file_already_processed(&event.file_name);
        if skip_rename {
            tracing::info!(
                "[Processor] {} matches a previous output name, keeping it",
                event.file_name
            );
        }

        let is_image = crate::ai::vision::is_image_extension(&event.extension);

        let (document, extraction_charge) =
            self.extractor.extract(&event.path, &event.extension).await?;
        if let Some(charge) = extraction_charge {
            usage.add(charge);
        }

        let (categorization, ocr_text) = self
            .categorize(event, config, &document.text, is_image, usage)
            .await;
        *confidence = Some(categorization.confidence);
        *reasoning = Some(categorization.reasoning.clone());

        // For images the only usable text is what the vision pass read off
        // the page; append it so variable extraction has something to work on
        let naming_text = match ocr_text {
            Some(ocr) if !ocr.trim().is_empty() => {
                if document.text.trim().is_empty() {
                    ocr
                } else {
                    format!("{}\n{}", document.text, ocr)
                }
            }
            _ => document.text.clone(),
        };

        let category = match config.find_category(&categorization.category) {
            Some(category) => category,
            None => {
                tracing::warn!(
                    "[Processor] Unknown category '{}', falling back to General",
                    categorization.category
                );
                config
                    .general_category()
                    .ok_or(ProcessorError::MissingGeneralCategory)?
            }
        };
        *category_name = category.name.clone();

        let desired_base = if skip_rename {
            // Unused by the organizer when skip_rename is set
            String::new()
        } else {
            self.derive_name(event, config, category, &naming_text, usage)
                .await
        };

        let organized = self.organizer.process_file(
            &event.path,
            &category.name,
            &desired_base,
            config,
            skip_rename,
        )?;

        Ok(organized)
    }

    /// Categorization with its fallback policy: text documents need
    /// non-empty text, images go through vision. Gateway failures degrade to
    /// the General fallback and never abort the pipeline. For images the
    /// second element carries any text the vision pass could read.
    async fn categorize(
        &self,
        event: &FileEvent,
        config: &AppConfig,
        text: &str,
        is_image: bool,
        usage: &mut TokenUsage,
    ) -> (Categorization, Option<String>) {
        if is_image {
            let (analysis, charge) = self
                .categorizer
                .analyze_image(&event.path, &config.categories, &config.expertise)
                .await;
            usage.add(charge);
            return (
                Categorization {
                    category: analysis.category,
                    reasoning: analysis.reasoning,
                    confidence: analysis.confidence,
                },
                analysis.extracted_text,
            );
        }

        if text.trim().is_empty() {
            // Counts as a categorization failure, not a pipeline abort
            tracing::warn!(
                "[Processor] {} produced no text, using fallback category",
                event.file_name
            );
            return (Categorization::fallback(), None);
        }

        let feedback = self.feedback.get_relevant_feedback(text, GENERAL_CATEGORY);
        let (categorization, charge) = self
            .categorizer
            .categorize_document(text, &config.categories, &config.expertise, &feedback)
            .await;
        usage.add(charge);
        (categorization, None)
    }

    /// Resolve the category's naming pattern into a sanitized base name
    /// (extension excluded).
    async fn derive_name(
        &self,
        event: &FileEvent,
        config: &AppConfig,
        category: &Category,
        text: &str,
        usage: &mut TokenUsage,
    ) -> String {
        let original_stem = std::path::Path::new(&event.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| event.file_name.clone());

        let original_formatting = config
            .find_variable(ORIGINAL_NAME_VARIABLE)
            .map(|v| v.formatting)
            .unwrap_or_default();
        let formatted_original = naming::apply_formatting(&original_stem, original_formatting);

        let pattern = category.naming_pattern.trim();
        let placeholders = naming::extract_placeholders(pattern);

        // The identity pattern needs no AI round-trips
        if pattern == "{original_name}" {
            return naming::sanitize_filename(&formatted_original);
        }

        let mut values: HashMap<String, String> = HashMap::new();
        values.insert(ORIGINAL_NAME_VARIABLE.to_string(), formatted_original);

        let feedback = self.feedback.get_relevant_feedback(text, &category.name);

        for placeholder in placeholders {
            if placeholder == ORIGINAL_NAME_VARIABLE {
                continue;
            }

            let Some(variable) = config.find_variable(&placeholder) else {
                tracing::warn!(
                    "[Processor] Pattern references undefined variable '{}'",
                    placeholder
                );
                values.insert(placeholder.clone(), placeholder_token(&placeholder));
                continue;
            };

            let (extracted, charge) = self
                .categorizer
                .extract_variable(text, variable, &feedback)
                .await;
            usage.add(charge);

            let value = match extracted {
                Some(extracted) => {
                    naming::apply_formatting(extracted.value.trim(), variable.formatting)
                }
                None => placeholder_token(&placeholder),
            };
            values.insert(placeholder, value);
        }

        naming::sanitize_filename(&naming::apply_pattern(pattern, &values))
    }
}

/// Visible token substituted for a variable that could not be resolved.
/// Filename sanitization later renders it as `_VARNAME_`.
fn placeholder_token(name: &str) -> String {
    format!("<{}>", name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{
        AiError, DocumentAi, ExtractedVariable, ImageAnalysis, TokenCharge,
    };
    use crate::config::{Category, Variable};
    use crate::feedback::RelevantFeedback;
    use crate::naming::Formatting;
    use crate::watcher::FileEventKind;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    /// Scriptable AI stand-in
    struct FakeAi {
        category: Option<String>,
        variables: HashMap<String, String>,
    }

    impl FakeAi {
        fn returning(category: &str) -> Self {
            Self {
                category: Some(category.to_string()),
                variables: HashMap::new(),
            }
        }

        fn failing() -> Self {
            Self {
                category: None,
                variables: HashMap::new(),
            }
        }

        fn with_variable(mut self, name: &str, value: &str) -> Self {
            self.variables.insert(name.to_string(), value.to_string());
            self
        }
    }

    #[async_trait]
    impl DocumentAi for FakeAi {
        async fn categorize(
            &self,
            _text: &str,
            _categories: &[Category],
            _expertise: &str,
            _feedback: &RelevantFeedback,
        ) -> Result<(Categorization, TokenCharge), AiError> {
            match &self.category {
                Some(category) => Ok((
                    Categorization {
                        category: category.clone(),
                        reasoning: "matched the description".to_string(),
                        confidence: 0.92,
                    },
                    TokenCharge {
                        operation: "categorization".to_string(),
                        tokens: 120,
                        cost: 0.0002,
                    },
                )),
                None => Err(AiError::Api("model overloaded".to_string())),
            }
        }

        async fn extract_variable(
            &self,
            _text: &str,
            variable: &Variable,
            _feedback: &RelevantFeedback,
        ) -> Result<(ExtractedVariable, TokenCharge), AiError> {
            match self.variables.get(&variable.name) {
                Some(value) => Ok((
                    ExtractedVariable {
                        value: value.clone(),
                        confidence: 0.9,
                        context: None,
                    },
                    TokenCharge {
                        operation: format!("variable_extraction:{}", variable.name),
                        tokens: 40,
                        cost: 0.0001,
                    },
                )),
                None => Err(AiError::Api("value not found".to_string())),
            }
        }

        async fn analyze_image(
            &self,
            _path: &Path,
            _categories: &[Category],
            _expertise: &str,
        ) -> Result<(ImageAnalysis, TokenCharge), AiError> {
            Err(AiError::Api("vision unavailable".to_string()))
        }

        async fn transcribe_audio(
            &self,
            _path: &Path,
        ) -> Result<(String, TokenCharge), AiError> {
            Err(AiError::Api("transcription unavailable".to_string()))
        }
    }

    struct FakeLog {
        already_processed: bool,
    }

    impl ProcessingLog for FakeLog {
        fn is_file_already_processed(&self, _file_name: &str) -> bool {
            self.already_processed
        }
    }

    struct NullTracker;

    impl crate::watcher::MoveTracker for NullTracker {
        fn mark_file_as_moved(&self, _original: &Path, _new: &Path) {}
    }

    struct Fixture {
        _dir: TempDir,
        watched: std::path::PathBuf,
        processor: DocumentProcessor,
    }

    fn fixture(ai: FakeAi, config: AppConfig, already_processed: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let watched = dir.path().join("watched");
        std::fs::create_dir_all(&watched).unwrap();

        let mut config = config;
        config.watched_folder = watched.to_string_lossy().to_string();

        let config_store = ConfigStore::with_dir(dir.path().join("conf"));
        config_store.save(&config.validate_and_repair()).unwrap();

        let ai: Arc<dyn DocumentAi> = Arc::new(ai);
        let processor = DocumentProcessor::new(
            config_store,
            TextExtractor::new(ai.clone()),
            Categorizer::new(ai),
            FeedbackStore::with_dir(dir.path().join("conf")),
            Arc::new(FakeLog { already_processed }),
            FileOrganizer::new(Arc::new(NullTracker)),
        );

        Fixture {
            _dir: dir,
            watched,
            processor,
        }
    }

    fn drop_file(fixture: &Fixture, name: &str, content: &str) -> FileEvent {
        let path = fixture.watched.join(name);
        std::fs::write(&path, content).unwrap();
        FileEvent {
            path: path.clone(),
            file_name: name.to_string(),
            extension: Path::new(name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            kind: FileEventKind::Add,
        }
    }

    fn invoices_config() -> AppConfig {
        let mut config = AppConfig::default();
        config
            .add_category(Category {
                name: "Invoices".to_string(),
                description: "Vendor invoices".to_string(),
                naming_pattern: "Invoice_{date}_{vendor}".to_string(),
            })
            .unwrap();
        config
            .add_variable(Variable {
                name: "date".to_string(),
                description: "The invoice date".to_string(),
                formatting: Formatting::None,
            })
            .unwrap();
        config
            .add_variable(Variable {
                name: "vendor".to_string(),
                description: "The issuing company".to_string(),
                formatting: Formatting::None,
            })
            .unwrap();
        config
    }

    #[tokio::test]
    async fn test_identity_pattern_keeps_name_and_place() {
        let fixture = fixture(FakeAi::returning("General"), AppConfig::default(), false);
        let event = drop_file(&fixture, "report.txt", "quarterly report body text");

        let result = fixture.processor.process_document(&event).await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.category, "General");
        assert_eq!(result.new_name, "report.txt");
        // Organization disabled and name unchanged: the file never moved
        assert!(event.path.exists());
        assert_eq!(
            result.new_path,
            Some(event.path.to_string_lossy().to_string())
        );
    }

    #[tokio::test]
    async fn test_categorization_failure_never_aborts() {
        let fixture = fixture(FakeAi::failing(), AppConfig::default(), false);
        let event = drop_file(&fixture, "mystery.txt", "some text content here");

        let result = fixture.processor.process_document(&event).await;

        assert!(result.success);
        assert_eq!(result.category, "General");
        assert_eq!(result.confidence, Some(0.0));
        assert_eq!(result.reasoning.as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn test_pattern_name_derivation_and_move() {
        let ai = FakeAi::returning("Invoices")
            .with_variable("date", "2024-01-15")
            .with_variable("vendor", "Acme");
        let mut config = invoices_config();
        config.enable_organization = true;

        let fixture = fixture(ai, config, false);
        let event = drop_file(&fixture, "scan001.txt", "Invoice from Acme dated 2024-01-15");

        let result = fixture.processor.process_document(&event).await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.category, "Invoices");
        assert_eq!(result.new_name, "Invoice_2024-01-15_Acme.txt");
        let expected = fixture
            .watched
            .join("Invoices")
            .join("Invoice_2024-01-15_Acme.txt");
        assert!(expected.exists());
        assert!(!event.path.exists());

        // One categorization plus two variable extractions
        assert_eq!(result.token_usage.operations.len(), 3);
        assert_eq!(result.token_usage.total_tokens, 200);
    }

    #[tokio::test]
    async fn test_unresolved_variable_gets_visible_token() {
        // vendor resolves, date does not
        let ai = FakeAi::returning("Invoices").with_variable("vendor", "Acme");
        let fixture = fixture(ai, invoices_config(), false);
        let event = drop_file(&fixture, "scan002.txt", "Invoice from Acme");

        let result = fixture.processor.process_document(&event).await;

        assert!(result.success);
        // `<DATE>` survives as `_DATE_` after filename sanitization
        assert_eq!(result.new_name, "Invoice__DATE__Acme.txt");
    }

    #[tokio::test]
    async fn test_unknown_category_resolves_to_general() {
        let ai = FakeAi::returning("Nonexistent");
        let fixture = fixture(ai, AppConfig::default(), false);
        let event = drop_file(&fixture, "odd.txt", "text content");

        let result = fixture.processor.process_document(&event).await;

        assert!(result.success);
        assert_eq!(result.category, "General");
    }

    #[tokio::test]
    async fn test_already_processed_keeps_current_name() {
        let ai = FakeAi::returning("Invoices")
            .with_variable("date", "2024-01-15")
            .with_variable("vendor", "Acme");
        let mut config = invoices_config();
        config.enable_organization = true;

        let fixture = fixture(ai, config, true);
        let event = drop_file(&fixture, "Invoice_2023_Acme.txt", "invoice text");

        let result = fixture.processor.process_document(&event).await;

        assert!(result.success);
        // Still categorized, but the name is reused verbatim
        assert_eq!(result.category, "Invoices");
        assert_eq!(result.new_name, "Invoice_2023_Acme.txt");
        assert!(fixture
            .watched
            .join("Invoices")
            .join("Invoice_2023_Acme.txt")
            .exists());
    }

    #[tokio::test]
    async fn test_missing_file_fails_with_file_access() {
        let fixture = fixture(FakeAi::returning("General"), AppConfig::default(), false);
        let event = FileEvent {
            path: fixture.watched.join("ghost.txt"),
            file_name: "ghost.txt".to_string(),
            extension: "txt".to_string(),
            kind: FileEventKind::Add,
        };

        let result = fixture.processor.process_document(&event).await;

        assert!(!result.success);
        assert_eq!(result.processing_step, Some(ProcessingStep::FileAccess));
        assert!(result.error.is_some());
        assert_eq!(result.new_name, "ghost.txt");
    }

    #[tokio::test]
    async fn test_unsupported_type_classified_as_extraction() {
        let fixture = fixture(FakeAi::returning("General"), AppConfig::default(), false);
        let event = drop_file(&fixture, "archive.zip", "binary-ish");

        let result = fixture.processor.process_document(&event).await;

        assert!(!result.success);
        assert_eq!(result.processing_step, Some(ProcessingStep::TextExtraction));
    }

    #[tokio::test]
    async fn test_empty_text_uses_fallback_category() {
        let fixture = fixture(FakeAi::returning("Invoices"), AppConfig::default(), false);
        let event = drop_file(&fixture, "blank.txt", "   \n  \n ");

        let result = fixture.processor.process_document(&event).await;

        // Empty text degrades categorization, but the file is still filed
        assert!(result.success);
        assert_eq!(result.category, "General");
        assert_eq!(result.reasoning.as_deref(), Some("fallback"));
    }
}
