//! Naming engine
//!
//! Pure functions for naming patterns: placeholder parsing, value
//! substitution, case transforms and filename sanitization. No state, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Matches `{variable_name}` tokens inside a naming pattern
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("invalid placeholder regex"));

/// Text transform applied to a resolved variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formatting {
    Uppercase,
    Lowercase,
    Title,
    Sentence,
    Kebab,
    Snake,
    Camel,
    Pascal,
    /// Unrecognized modes deserialize to `None` (identity)
    #[default]
    #[serde(other)]
    None,
}

/// Extract the placeholder names from a pattern, deduplicated, in order of
/// first appearance.
pub fn extract_placeholders(pattern: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in PLACEHOLDER_RE.captures_iter(pattern) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Substitute resolved values into a pattern.
///
/// Every `{name}` occurrence with an entry in `values` is replaced; names
/// without an entry are left as literal `{name}` so a half-resolved pattern
/// stays visible in the output instead of silently losing segments.
pub fn apply_pattern(pattern: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(pattern, |cap: &regex::Captures| match values.get(&cap[1]) {
            Some(value) => value.clone(),
            None => cap[0].to_string(),
        })
        .into_owned()
}

/// Apply a case transform to text.
pub fn apply_formatting(text: &str, mode: Formatting) -> String {
    match mode {
        Formatting::None => text.to_string(),
        Formatting::Uppercase => text.to_uppercase(),
        Formatting::Lowercase => text.to_lowercase(),
        Formatting::Title => text
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
        Formatting::Sentence => capitalize(&text.to_lowercase()),
        Formatting::Kebab => separate_words(text, '-'),
        Formatting::Snake => separate_words(text, '_'),
        Formatting::Camel => {
            let pascal = to_pascal(text);
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => pascal,
            }
        }
        Formatting::Pascal => to_pascal(text),
    }
}

/// Replace filesystem-reserved characters with `_`, collapse whitespace runs
/// to a single space and trim.
pub fn sanitize_filename(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercase the first character, leave the rest untouched
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the text and collapse every non-alphanumeric run into `sep`
fn separate_words(text: &str, sep: char) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_sep = false;

    for c in lowered.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push(sep);
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    out
}

/// Capitalize each word and remove the separators between them
fn to_pascal(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| capitalize(&word.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_placeholders() {
        assert_eq!(
            extract_placeholders("Invoice_{date}_{vendor}"),
            vec!["date".to_string(), "vendor".to_string()]
        );
        assert_eq!(
            extract_placeholders("{a}_{b}_{a}"),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(extract_placeholders("no placeholders here").is_empty());
    }

    #[test]
    fn test_apply_pattern() {
        let result = apply_pattern(
            "Invoice_{date}_{vendor}",
            &values(&[("date", "2024-01-15"), ("vendor", "Acme")]),
        );
        assert_eq!(result, "Invoice_2024-01-15_Acme");
    }

    #[test]
    fn test_apply_pattern_repeated_placeholder() {
        let result = apply_pattern("{name}-{name}", &values(&[("name", "x")]));
        assert_eq!(result, "x-x");
    }

    #[test]
    fn test_apply_pattern_keeps_unresolved_literal() {
        let result = apply_pattern(
            "Doc_{existing}_{missing}_{original_name}",
            &values(&[("existing", "value"), ("original_name", "fallback")]),
        );
        assert_eq!(result, "Doc_value_{missing}_fallback");
    }

    #[test]
    fn test_formatting_basic_modes() {
        assert_eq!(apply_formatting("Hello World", Formatting::Uppercase), "HELLO WORLD");
        assert_eq!(apply_formatting("Hello World", Formatting::Lowercase), "hello world");
        assert_eq!(apply_formatting("hello world", Formatting::Title), "Hello World");
        assert_eq!(apply_formatting("hello WORLD", Formatting::Sentence), "Hello world");
        assert_eq!(apply_formatting("hello", Formatting::None), "hello");
    }

    #[test]
    fn test_formatting_separator_modes() {
        assert_eq!(apply_formatting("Hello World", Formatting::Kebab), "hello-world");
        assert_eq!(apply_formatting("Hello, World!", Formatting::Kebab), "hello-world");
        assert_eq!(apply_formatting("Hello World", Formatting::Snake), "hello_world");
    }

    #[test]
    fn test_formatting_word_boundary_modes() {
        assert_eq!(apply_formatting("hello world", Formatting::Pascal), "HelloWorld");
        assert_eq!(apply_formatting("hello world", Formatting::Camel), "helloWorld");
        assert_eq!(apply_formatting("acme corp invoice", Formatting::Pascal), "AcmeCorpInvoice");
    }

    #[test]
    fn test_formatting_unknown_mode_deserializes_to_none() {
        let mode: Formatting = serde_json::from_str("\"sparkle\"").unwrap();
        assert_eq!(mode, Formatting::None);
    }

    #[test]
    fn test_sanitize_filename_strips_reserved_chars() {
        let cleaned = sanitize_filename("a/b\\c:d*e?f\"g<h>i|j");
        for forbidden in ['/', '\\', ':', '*', '?', '"', '<', '>', '|'] {
            assert!(!cleaned.contains(forbidden), "found {:?} in {:?}", forbidden, cleaned);
        }
        assert_eq!(cleaned, "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_filename_collapses_whitespace() {
        assert_eq!(sanitize_filename("  report   of \t the  year "), "report of the year");
    }
}
