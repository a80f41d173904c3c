use crate::config::{Category, Variable};
use crate::feedback::RelevantFeedback;

/// Maximum document text injected into a prompt
const MAX_PROMPT_TEXT_CHARS: usize = 8_000;

/// System prompt for document categorization
pub const CATEGORIZE_SYSTEM_PROMPT: &str = r#"You are a document categorization assistant. Your task is to assign a document to exactly one of the user's categories based on its text.

RULES:
1. Respond with ONLY a JSON object: {"category": "<name>", "reasoning": "<one sentence>", "confidence": <0.0-1.0>}
2. The category MUST be one of the provided category names, spelled exactly
3. Use the category descriptions, not just the names, to decide
4. If nothing fits well, choose "General" with low confidence
5. Past corrections listed in the prompt override your own judgement when they apply"#;

/// System prompt for naming-variable extraction
pub const EXTRACT_VARIABLE_SYSTEM_PROMPT: &str = r#"You are a document data extraction assistant. Your task is to extract a single named value from document text.

RULES:
1. Respond with ONLY a JSON object: {"value": "<extracted value>", "confidence": <0.0-1.0>, "context": "<the sentence it came from>"}
2. Keep the value short and filename-safe: no slashes, no quotes
3. For dates, prefer ISO format: 2024-01-15
4. If the value is not present in the text, respond with {"value": "", "confidence": 0.0, "context": ""}"#;

/// System prompt for vision-based categorization of image documents
pub const VISION_SYSTEM_PROMPT: &str = r#"You are a document categorization assistant. You are shown an image of a document (photo, scan or screenshot). Assign it to exactly one of the user's categories.

RULES:
1. Respond with ONLY a JSON object: {"category": "<name>", "reasoning": "<one sentence>", "confidence": <0.0-1.0>, "extracted_text": "<any text you can read off the image>"}
2. The category MUST be one of the provided category names, spelled exactly
3. If nothing fits well, choose "General" with low confidence"#;

/// Build the user prompt for text categorization
pub fn build_categorize_prompt(
    text: &str,
    categories: &[Category],
    expertise: &str,
    feedback: &RelevantFeedback,
) -> String {
    let mut prompt = String::from("CATEGORIES:\n");
    for category in categories {
        prompt.push_str(&format!("- {}: {}\n", category.name, category.description));
    }

    if !expertise.trim().is_empty() {
        prompt.push_str(&format!("\nUSER PROFILE:\n{}\n", expertise.trim()));
    }

    if !feedback.is_empty() {
        prompt.push_str(&format!(
            "\nPAST CORRECTIONS (follow these when they apply):\n{}",
            feedback.to_prompt_context()
        ));
    }

    prompt.push_str(&format!(
        "\nDOCUMENT TEXT:\n---\n{}\n---\n\nRespond with ONLY the JSON object.",
        truncate_chars(text, MAX_PROMPT_TEXT_CHARS)
    ));

    prompt
}

/// Build the user prompt for extracting one naming variable
pub fn build_extract_variable_prompt(
    text: &str,
    variable: &Variable,
    feedback: &RelevantFeedback,
) -> String {
    let mut prompt = format!(
        "VARIABLE TO EXTRACT:\nname: {}\ndescription: {}\n",
        variable.name, variable.description
    );

    if !feedback.name_corrections.is_empty() {
        prompt.push_str("\nPAST FILENAME CORRECTIONS (avoid repeating these mistakes):\n");
        for c in &feedback.name_corrections {
            prompt.push_str(&format!("- '{}' -> '{}'", c.was, c.corrected_to));
            if let Some(because) = &c.because {
                prompt.push_str(&format!(" because: {}", because));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!(
        "\nDOCUMENT TEXT:\n---\n{}\n---\n\nRespond with ONLY the JSON object.",
        truncate_chars(text, MAX_PROMPT_TEXT_CHARS)
    ));

    prompt
}

/// Build the text part of a vision categorization message
pub fn build_vision_prompt(categories: &[Category], expertise: &str) -> String {
    let mut prompt = String::from("CATEGORIES:\n");
    for category in categories {
        prompt.push_str(&format!("- {}: {}\n", category.name, category.description));
    }

    if !expertise.trim().is_empty() {
        prompt.push_str(&format!("\nUSER PROFILE:\n{}\n", expertise.trim()));
    }

    prompt.push_str("\nCategorize the attached document image. Respond with ONLY the JSON object.");

    prompt
}

/// Truncate on a char boundary without splitting words where possible
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(pos) => truncated[..pos].to_string(),
        None => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::Formatting;

    fn categories() -> Vec<Category> {
        vec![
            Category {
                name: "General".to_string(),
                description: "Everything else".to_string(),
                naming_pattern: "{original_name}".to_string(),
            },
            Category {
                name: "Invoices".to_string(),
                description: "Bills and invoices".to_string(),
                naming_pattern: "Invoice_{date}".to_string(),
            },
        ]
    }

    #[test]
    fn test_categorize_prompt_lists_categories() {
        let prompt = build_categorize_prompt(
            "some document text",
            &categories(),
            "",
            &RelevantFeedback::default(),
        );
        assert!(prompt.contains("- General: Everything else"));
        assert!(prompt.contains("- Invoices: Bills and invoices"));
        assert!(prompt.contains("some document text"));
        assert!(!prompt.contains("PAST CORRECTIONS"));
    }

    #[test]
    fn test_extract_prompt_includes_variable() {
        let variable = Variable {
            name: "vendor".to_string(),
            description: "The issuing company".to_string(),
            formatting: Formatting::None,
        };
        let prompt =
            build_extract_variable_prompt("text body", &variable, &RelevantFeedback::default());
        assert!(prompt.contains("name: vendor"));
        assert!(prompt.contains("The issuing company"));
    }

    #[test]
    fn test_long_text_is_truncated() {
        let text = "word ".repeat(10_000);
        let prompt = build_categorize_prompt(
            &text,
            &categories(),
            "",
            &RelevantFeedback::default(),
        );
        assert!(prompt.len() < text.len());
    }
}
