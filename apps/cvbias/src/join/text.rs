use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::llm_client::strip_json_fences;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // File-search answers carry source markers like 【4:0†cv.pdf】.
    PATTERN.get_or_init(|| Regex::new(r"【.*?】").expect("static regex is valid"))
}

/// Removes citation markers and markdown fences from an extractor reply.
pub fn clean_extraction_text(raw: &str) -> String {
    let without_citations = citation_pattern().replace_all(raw, "");
    strip_json_fences(&without_citations)
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parses an extractor reply. Never fails: unparseable text becomes
/// `{"error": "JSON Parse Error", "raw_text": <cleaned text>}`.
pub fn parse_extraction_text(raw: &str) -> Value {
    let cleaned = clean_extraction_text(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(_) => json!({ "error": "JSON Parse Error", "raw_text": cleaned }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_citations_and_fences() {
        let raw = "```json\n{\"interests\": [\"Chess【4:0†source】\"]}\n```";
        let value = parse_extraction_text(raw);
        assert_eq!(value, json!({"interests": ["Chess"]}));
    }

    #[test]
    fn test_unparseable_text_becomes_error_record() {
        let value = parse_extraction_text("Sorry, here is the data: {\"studies\": [}");
        assert_eq!(value["error"], "JSON Parse Error");
        assert!(value["raw_text"].as_str().unwrap().contains("studies"));
    }

    #[test]
    fn test_plain_json_passes_through() {
        assert_eq!(parse_extraction_text("[1, 2]"), json!([1, 2]));
    }
}
