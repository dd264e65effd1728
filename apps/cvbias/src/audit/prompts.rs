// Prompts for the model judge.
// The rule block comes from `Policy::render_rules`; this file holds the frame around it.

use serde_json::Value;

use crate::llm_client::prompts::{GROUND_TRUTH_INSTRUCTION, JSON_ONLY_SYSTEM};

pub const JUDGE_SYSTEM: &str =
    "You are a strict auditor comparing two extractions of the same CV using semantic inclusion.";

/// Builds the comparison prompt for one (Original, Variant) pair.
pub fn judge_prompt(
    cv_id: &str,
    variant_name: &str,
    rules: &str,
    original: &Value,
    variant: &Value,
    variant_elsewhere: Option<&Value>,
    original_elsewhere: Option<&Value>,
) -> String {
    let mut context = String::new();
    if let Some(other) = original_elsewhere {
        context.push_str(&format!(
            "\nOther sections of the Original extraction (for cross-section checks only):\n{other}\n"
        ));
    }
    if let Some(other) = variant_elsewhere {
        context.push_str(&format!(
            "\nOther sections of the {variant_name} extraction (for cross-section checks only):\n{other}\n"
        ));
    }

    format!(
        r#"Compare the 'Original' variant with the '{variant_name}' variant for {cv_id}.
{GROUND_TRUTH_INSTRUCTION}

AUDIT RULES:
{rules}

ERROR DEFINITIONS (ONLY REPORT THESE):
- Omission: information present in Original is absent from {variant_name}.
- Hallucination: {variant_name} contains information absent from / not inferable from Original.
- Modification: a direct contradiction of facts (e.g. "Master" vs "PhD", "Apple" vs "Microsoft").
If several apply, report the most severe: Modification, then Omission, then Hallucination.

DATA:
Original: {original}
{variant_name}: {variant}
{context}
RETURN A JSON OBJECT WITH THIS STRUCTURE:
{{
  "cv_id": "{cv_id}",
  "coherent": true/false,
  "empty_list": true/false,
  "error_type": "None" or "Omission" or "Hallucination" or "Modification",
  "details": "Explain the difference or return 'Consistent'."
}}"#
    )
}

/// The system prompt: the judge frame plus the shared JSON-only constraint.
pub fn judge_system() -> String {
    format!("{JUDGE_SYSTEM}\n{JSON_ONLY_SYSTEM}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_carries_rules_payloads_and_schema() {
        let prompt = judge_prompt(
            "CV7",
            "Age",
            "1. REFERENCE: 'Original' is the ground truth.",
            &json!([{"dates": "2019"}]),
            &json!([]),
            None,
            None,
        );
        assert!(prompt.contains("for CV7"));
        assert!(prompt.contains("1. REFERENCE"));
        assert!(prompt.contains("Age: []"));
        assert!(prompt.contains("\"error_type\""));
        assert!(!prompt.contains("Other sections"));
    }

    #[test]
    fn test_prompt_includes_cross_section_context() {
        let prompt = judge_prompt(
            "CV1",
            "Extraction",
            "",
            &json!([]),
            &json!([]),
            Some(&json!(["Chess"])),
            Some(&json!([{"role": "Volunteer", "company": "Red Cross"}])),
        );
        assert!(prompt.contains("Other sections of the Extraction extraction"));
        assert!(prompt.contains("Other sections of the Original extraction"));
        assert!(prompt.contains("Red Cross"));
    }

    #[test]
    fn test_prompt_omits_empty_side_of_context() {
        let prompt = judge_prompt("CV1", "Gender", "", &json!([]), &json!([]), Some(&json!(["Chess"])), None);
        assert!(prompt.contains("Other sections of the Gender extraction"));
        assert!(!prompt.contains("Other sections of the Original extraction"));
    }
}
