//! AI gateway: categorization, variable extraction, image analysis and
//! audio transcription, with usage accounting.

pub mod categorizer;
pub mod client;
pub mod credentials;
pub mod http_client;
pub mod prompts;
pub mod vision;

pub use categorizer::Categorizer;
pub use client::OpenAiClient;
pub use credentials::CredentialManager;

use crate::config::{Category, Variable};
use crate::feedback::RelevantFeedback;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from AI calls. Callers supply per-call-site fallbacks; none of
/// these abort a pipeline on their own.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("API key not configured: {0}")]
    Credentials(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("unparseable response: {0}")]
    Parse(String),
    #[error("image preparation failed: {0}")]
    Image(String),
}

/// Tokens and cost attributed to a single AI operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCharge {
    pub operation: String,
    pub tokens: u32,
    pub cost: f64,
}

impl TokenCharge {
    /// A zero-cost charge, used when a call fell back without reaching the
    /// API
    pub fn zero(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            tokens: 0,
            cost: 0.0,
        }
    }
}

/// Categorization decision for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Categorization {
    pub category: String,
    pub reasoning: String,
    pub confidence: f32,
}

impl Categorization {
    /// The safe default substituted when categorization fails
    pub fn fallback() -> Self {
        Self {
            category: crate::config::GENERAL_CATEGORY.to_string(),
            reasoning: "fallback".to_string(),
            confidence: 0.0,
        }
    }
}

/// A variable value extracted from document text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedVariable {
    pub value: String,
    pub confidence: f32,
    /// Where in the document the value was found
    #[serde(default)]
    pub context: Option<String>,
}

/// Vision-based categorization of an image document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub category: String,
    pub reasoning: String,
    pub confidence: f32,
    /// Text the model could read off the image, if any
    #[serde(default)]
    pub extracted_text: Option<String>,
}

/// The raw AI service. Implementations may fail; the [`Categorizer`]
/// gateway layers the fallback policy on top. Tests substitute a fake.
#[async_trait]
pub trait DocumentAi: Send + Sync {
    async fn categorize(
        &self,
        text: &str,
        categories: &[Category],
        expertise: &str,
        feedback: &RelevantFeedback,
    ) -> Result<(Categorization, TokenCharge), AiError>;

    async fn extract_variable(
        &self,
        text: &str,
        variable: &Variable,
        feedback: &RelevantFeedback,
    ) -> Result<(ExtractedVariable, TokenCharge), AiError>;

    async fn analyze_image(
        &self,
        path: &Path,
        categories: &[Category],
        expertise: &str,
    ) -> Result<(ImageAnalysis, TokenCharge), AiError>;

    async fn transcribe_audio(&self, path: &Path) -> Result<(String, TokenCharge), AiError>;
}
