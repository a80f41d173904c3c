//! Categorization gateway.
//!
//! Wraps the raw AI service with the per-call fallback policy: every call
//! degrades to a safe default instead of propagating the error, so AI
//! failures never abort a pipeline.

use super::{
    AiError, Categorization, DocumentAi, ExtractedVariable, ImageAnalysis, TokenCharge,
};
use crate::config::{Category, Variable};
use crate::feedback::RelevantFeedback;
use std::path::Path;
use std::sync::Arc;

/// Fallback-laden gateway over a [`DocumentAi`] implementation
pub struct Categorizer {
    ai: Arc<dyn DocumentAi>,
}

impl Categorizer {
    pub fn new(ai: Arc<dyn DocumentAi>) -> Self {
        Self { ai }
    }

    /// Categorize document text. On any failure, returns the `General`
    /// fallback with zero confidence.
    pub async fn categorize_document(
        &self,
        text: &str,
        categories: &[Category],
        expertise: &str,
        feedback: &RelevantFeedback,
    ) -> (Categorization, TokenCharge) {
        match self.ai.categorize(text, categories, expertise, feedback).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("[Categorizer] Categorization failed, using fallback: {}", e);
                (Categorization::fallback(), TokenCharge::zero("categorization"))
            }
        }
    }

    /// Extract one naming variable. On failure or an empty value, returns
    /// `None`; the caller substitutes its visible placeholder token.
    pub async fn extract_variable(
        &self,
        text: &str,
        variable: &Variable,
        feedback: &RelevantFeedback,
    ) -> (Option<ExtractedVariable>, TokenCharge) {
        match self.ai.extract_variable(text, variable, feedback).await {
            Ok((extracted, charge)) => {
                if extracted.value.trim().is_empty() {
                    (None, charge)
                } else {
                    (Some(extracted), charge)
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[Categorizer] Variable extraction for '{}' failed: {}",
                    variable.name,
                    e
                );
                (
                    None,
                    TokenCharge::zero(&format!("variable_extraction:{}", variable.name)),
                )
            }
        }
    }

    /// Vision-categorize an image document. On failure, returns the
    /// `General` fallback with no extracted text.
    pub async fn analyze_image(
        &self,
        path: &Path,
        categories: &[Category],
        expertise: &str,
    ) -> (ImageAnalysis, TokenCharge) {
        match self.ai.analyze_image(path, categories, expertise).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("[Categorizer] Image analysis failed, using fallback: {}", e);
                let fallback = Categorization::fallback();
                (
                    ImageAnalysis {
                        category: fallback.category,
                        reasoning: fallback.reasoning,
                        confidence: fallback.confidence,
                        extracted_text: None,
                    },
                    TokenCharge::zero("image_analysis"),
                )
            }
        }
    }

    /// Transcribe an audio file. Unlike the calls above this propagates the
    /// error: transcription feeds extraction, whose failure policy lives in
    /// the extraction gateway.
    pub async fn transcribe_audio(&self, path: &Path) -> Result<(String, TokenCharge), AiError> {
        self.ai.transcribe_audio(path).await
    }
}
