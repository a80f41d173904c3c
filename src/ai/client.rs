//! OpenAI-compatible API client.
//!
//! All calls are single-shot JSON exchanges: the prompt pins the response
//! shape and the body is parsed into a typed struct. Streaming is not used.

use super::credentials::CredentialManager;
use super::http_client::{openai_client, transcription_client};
use super::prompts;
use super::vision;
use super::{AiError, Categorization, DocumentAi, ExtractedVariable, ImageAnalysis, TokenCharge};
use crate::config::{Category, Variable};
use crate::feedback::RelevantFeedback;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Model used for text categorization and variable extraction
const TEXT_MODEL: &str = "gpt-4o-mini";

/// Model used for vision-based categorization
const VISION_MODEL: &str = "gpt-4o";

/// Model used for audio transcription
const TRANSCRIPTION_MODEL: &str = "whisper-1";

const MAX_COMPLETION_TOKENS: u32 = 1_024;

/// USD per one million tokens: (model, input, output)
const MODEL_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
];

/// USD per minute of transcribed audio
const TRANSCRIPTION_PRICE_PER_MINUTE: f64 = 0.006;

/// Token usage block in API responses
#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat completions response body
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

/// Transcription response body (`verbose_json` format)
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
}

/// API error response envelope
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Compute the cost of a call from the model's price table
fn compute_cost(model: &str, usage: &ApiUsage) -> f64 {
    let Some((_, input, output)) = MODEL_PRICES.iter().find(|(m, _, _)| *m == model).copied()
    else {
        return 0.0;
    };
    (usage.prompt_tokens as f64 * input + usage.completion_tokens as f64 * output) / 1_000_000.0
}

/// Strip Markdown code fences some models wrap JSON responses in
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse the model's reply as a JSON object of the expected shape
fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(cleaned).map_err(|e| AiError::Parse(format!("{}: {}", e, cleaned)))
}

/// OpenAI API client
pub struct OpenAiClient;

impl OpenAiClient {
    pub fn new() -> Self {
        Self
    }

    /// Send a chat completion expecting a JSON object back.
    ///
    /// `user_content` is either a plain string or a content-part array
    /// (for vision messages).
    async fn send_json_message(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: Value,
        operation: &str,
    ) -> Result<(String, TokenCharge), AiError> {
        let api_key =
            CredentialManager::get_api_key("openai").map_err(AiError::Credentials)?;

        let request = json!({
            "model": model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content},
            ],
        });

        let response = openai_client()
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&error_text) {
                return Err(AiError::Api(body.error.message));
            }
            return Err(AiError::Api(format!("{}: {}", status, error_text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        let usage = body.usage.unwrap_or_default();
        let charge = TokenCharge {
            operation: operation.to_string(),
            tokens: usage.total_tokens,
            cost: compute_cost(model, &usage),
        };

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::Parse("response contained no content".to_string()))?;

        Ok((text.trim().to_string(), charge))
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentAi for OpenAiClient {
    async fn categorize(
        &self,
        text: &str,
        categories: &[Category],
        expertise: &str,
        feedback: &RelevantFeedback,
    ) -> Result<(Categorization, TokenCharge), AiError> {
        let prompt = prompts::build_categorize_prompt(text, categories, expertise, feedback);
        let (reply, charge) = self
            .send_json_message(
                TEXT_MODEL,
                prompts::CATEGORIZE_SYSTEM_PROMPT,
                Value::String(prompt),
                "categorization",
            )
            .await?;

        let mut categorization: Categorization = parse_json_response(&reply)?;
        categorization.confidence = categorization.confidence.clamp(0.0, 1.0);
        Ok((categorization, charge))
    }

    async fn extract_variable(
        &self,
        text: &str,
        variable: &Variable,
        feedback: &RelevantFeedback,
    ) -> Result<(ExtractedVariable, TokenCharge), AiError> {
        let prompt = prompts::build_extract_variable_prompt(text, variable, feedback);
        let (reply, charge) = self
            .send_json_message(
                TEXT_MODEL,
                prompts::EXTRACT_VARIABLE_SYSTEM_PROMPT,
                Value::String(prompt),
                &format!("variable_extraction:{}", variable.name),
            )
            .await?;

        let mut extracted: ExtractedVariable = parse_json_response(&reply)?;
        extracted.confidence = extracted.confidence.clamp(0.0, 1.0);
        Ok((extracted, charge))
    }

    async fn analyze_image(
        &self,
        path: &Path,
        categories: &[Category],
        expertise: &str,
    ) -> Result<(ImageAnalysis, TokenCharge), AiError> {
        let data_url = vision::load_image_as_data_url(path).await?;
        let prompt = prompts::build_vision_prompt(categories, expertise);

        let content = json!([
            {"type": "text", "text": prompt},
            {"type": "image_url", "image_url": {"url": data_url}},
        ]);

        let (reply, charge) = self
            .send_json_message(
                VISION_MODEL,
                prompts::VISION_SYSTEM_PROMPT,
                content,
                "image_analysis",
            )
            .await?;

        let mut analysis: ImageAnalysis = parse_json_response(&reply)?;
        analysis.confidence = analysis.confidence.clamp(0.0, 1.0);
        Ok((analysis, charge))
    }

    async fn transcribe_audio(&self, path: &Path) -> Result<(String, TokenCharge), AiError> {
        let api_key =
            CredentialManager::get_api_key("openai").map_err(AiError::Credentials)?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AiError::Request(format!("Failed to read audio file: {}", e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let media_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&media_type)
            .map_err(|e| AiError::Request(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", "verbose_json")
            .part("file", part);

        let response = transcription_client()
            .post(OPENAI_TRANSCRIPTION_URL)
            .bearer_auth(&api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&error_text) {
                return Err(AiError::Api(body.error.message));
            }
            return Err(AiError::Api(format!("{}: {}", status, error_text)));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        let cost = body
            .duration
            .map(|secs| secs / 60.0 * TRANSCRIPTION_PRICE_PER_MINUTE)
            .unwrap_or(0.0);

        let charge = TokenCharge {
            operation: "audio_transcription".to_string(),
            tokens: 0,
            cost,
        };

        Ok((body.text, charge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_response() {
        let parsed: Categorization =
            parse_json_response("{\"category\": \"Invoices\", \"reasoning\": \"totals\", \"confidence\": 0.9}")
                .unwrap();
        assert_eq!(parsed.category, "Invoices");

        let err = parse_json_response::<Categorization>("no json here");
        assert!(err.is_err());
    }

    #[test]
    fn test_compute_cost_uses_price_table() {
        let usage = ApiUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
            total_tokens: 2_000_000,
        };
        let cost = compute_cost("gpt-4o-mini", &usage);
        assert!((cost - 0.75).abs() < 1e-9);
        assert_eq!(compute_cost("unknown-model", &usage), 0.0);
    }
}
