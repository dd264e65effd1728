//! Form-fidelity audit: a reference JSON (what each CV actually contains) against the
//! extractor's output for the same documents, under the `Extraction` policy. Each category
//! is judged with the other categories of both documents as cross-section context.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::audit::compare::Elsewhere;
use crate::audit::engine::AuditEngine;
use crate::audit::policy::Policy;
use crate::errors::AppError;
use crate::join::normalize_payload;
use crate::models::{AuditVerdict, Category, Dimension, Entry};
use crate::util::{read_json, write_json_pretty};

fn numeric_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[_-]?\d+$").expect("static regex is valid"))
}

fn spaced_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+\d+$").expect("static regex is valid"))
}

/// Document name used for matching: lowercase, without a trailing numeric suffix
/// (`Template_A_01` -> `template_a`).
pub fn normalize_document_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stem = lower
        .strip_suffix(".pdf")
        .or_else(|| lower.strip_suffix(".json"))
        .unwrap_or(&lower);
    let stripped = numeric_suffix_pattern().replace(stem, "");
    spaced_suffix_pattern().replace(&stripped, "").trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormAuditRecord {
    #[serde(flatten)]
    pub verdict: AuditVerdict,
    pub reference_used: String,
}

/// Splits one document record into normalized entries per category.
fn document_sections(record: &Value) -> BTreeMap<Category, Vec<Entry>> {
    let mut sections: BTreeMap<Category, Vec<Entry>> =
        Category::ALL.iter().map(|c| (*c, Vec::new())).collect();
    if let Some(map) = record.as_object() {
        for (key, payload) in map {
            if let Some(category) = Category::parse(key) {
                sections.insert(category, normalize_payload(category, payload));
            }
        }
    }
    sections
}

/// Every entry outside `category`, in category order.
fn other_sections(sections: &BTreeMap<Category, Vec<Entry>>, category: Category) -> Vec<Entry> {
    sections
        .iter()
        .filter(|(c, _)| **c != category)
        .flat_map(|(_, entries)| entries.iter().cloned())
        .collect()
}

/// Audits every extracted document that has a reference. Documents without one are
/// reported and skipped.
pub async fn audit_documents(
    engine: &AuditEngine,
    reference: &BTreeMap<String, Value>,
    extracted: &BTreeMap<String, Value>,
) -> Vec<FormAuditRecord> {
    let policy = Policy::for_dimension(Dimension::Extraction);
    let references: BTreeMap<String, &String> = reference
        .keys()
        .map(|name| (normalize_document_name(name), name))
        .collect();

    let mut records = Vec::new();
    for (name, record) in extracted {
        let Some(reference_name) = references.get(&normalize_document_name(name)) else {
            warn!(document = %name, "no reference document, skipping");
            continue;
        };
        let Some(reference_record) = reference.get(*reference_name) else {
            continue;
        };

        let expected = document_sections(reference_record);
        let actual = document_sections(record);

        for category in Category::ALL {
            let moved_out = other_sections(&actual, category);
            let moved_in = other_sections(&expected, category);
            let verdict = engine
                .audit_with_context(
                    category,
                    expected.get(&category).map(Vec::as_slice).unwrap_or(&[]),
                    actual.get(&category).map(Vec::as_slice).unwrap_or(&[]),
                    Elsewhere {
                        variant: &moved_out,
                        original: &moved_in,
                    },
                    &policy,
                    name,
                )
                .await;
            records.push(FormAuditRecord {
                verdict,
                reference_used: (*reference_name).clone(),
            });
        }
    }
    records
}

/// Reads both files, audits, and writes the report. Returns the records written.
pub async fn run_form_audit(
    engine: &AuditEngine,
    reference_path: &Path,
    extracted_path: &Path,
    report_path: &Path,
) -> Result<Vec<FormAuditRecord>, AppError> {
    for path in [reference_path, extracted_path] {
        if !path.is_file() {
            return Err(AppError::MissingInput {
                run: "form-audit".to_string(),
                path: path.to_path_buf(),
            });
        }
    }
    let reference: BTreeMap<String, Value> = read_json(reference_path)?;
    let extracted: BTreeMap<String, Value> = read_json(extracted_path)?;

    let records = audit_documents(engine, &reference, &extracted).await;
    write_json_pretty(report_path, &records)?;

    let errors = records.iter().filter(|r| r.verdict.is_error()).count();
    info!(
        documents = extracted.len(),
        audits = records.len(),
        errors,
        path = %report_path.display(),
        "form audit written"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::judge::RuleJudge;
    use crate::models::ErrorType;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine() -> AuditEngine {
        AuditEngine::new(Arc::new(RuleJudge), Duration::from_secs(5))
    }

    #[test]
    fn test_document_name_normalization() {
        assert_eq!(normalize_document_name("Template_A_01"), "template_a");
        assert_eq!(normalize_document_name("europass-3.pdf"), "europass");
        assert_eq!(normalize_document_name("Latex 12"), "latex");
        assert_eq!(normalize_document_name("modern"), "modern");
    }

    #[tokio::test]
    async fn test_empty_section_is_omission_and_equivalent_degree_is_coherent() {
        let reference: BTreeMap<String, Value> = serde_json::from_value(json!({
            "europass": {
                "experiences": [{"company": "Red Cross", "job_title": "Volunteer"}],
                "studies": [{"university": "INSA Lyon", "level_of_degree": "Diplome d'ingenieur"}],
                "interests": ["Chess"]
            }
        }))
        .unwrap();
        let extracted: BTreeMap<String, Value> = serde_json::from_value(json!({
            "Europass_07": {
                "List of professional experiences": [],
                "List of studies": [{"university": "INSA Lyon", "level_of_degree": "MSc"}],
                "List of personal interests": ["Chess", "Volunteer at Red Cross"]
            },
            "unknown_layout": {"interests": []}
        }))
        .unwrap();

        let records = audit_documents(&engine(), &reference, &extracted).await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.reference_used == "europass"));

        let by_category: BTreeMap<Category, &FormAuditRecord> =
            records.iter().map(|r| (r.verdict.category, r)).collect();
        // Empty section with a non-empty reference is still an empty-list omission.
        let experiences = &by_category[&Category::Experiences].verdict;
        assert_eq!(experiences.error_type, ErrorType::Omission);
        assert!(experiences.empty_list);
        assert!(by_category[&Category::Studies].verdict.coherent);
        // The volunteering came from the reference's experiences, so it is not invented.
        let interests = &by_category[&Category::Interests].verdict;
        assert!(interests.coherent, "{}", interests.details);
    }

    #[tokio::test]
    async fn test_migrated_entry_is_coherent_on_both_sides() {
        let reference: BTreeMap<String, Value> = serde_json::from_value(json!({
            "modern": {
                "experiences": [{"company": "Airbus", "job_title": "Analyst"},
                                {"company": "Red Cross", "job_title": "Volunteer"}],
                "interests": ["Chess"]
            }
        }))
        .unwrap();
        let extracted: BTreeMap<String, Value> = serde_json::from_value(json!({
            "modern_2": {
                "experiences": [{"company": "Airbus", "job_title": "Analyst"}],
                "interests": ["Chess", "Volunteer at Red Cross"]
            }
        }))
        .unwrap();
        let records = audit_documents(&engine(), &reference, &extracted).await;
        for category in [Category::Experiences, Category::Interests] {
            let verdict = &records
                .iter()
                .find(|r| r.verdict.category == category)
                .unwrap()
                .verdict;
            assert!(verdict.coherent, "{category}: {}", verdict.details);
        }
    }

    #[tokio::test]
    async fn test_extra_entry_absent_everywhere_is_still_hallucination() {
        let reference: BTreeMap<String, Value> = serde_json::from_value(json!({
            "modern": {
                "experiences": [{"company": "Airbus", "job_title": "Analyst"}],
                "interests": ["Chess"]
            }
        }))
        .unwrap();
        let extracted: BTreeMap<String, Value> = serde_json::from_value(json!({
            "modern": {
                "experiences": [{"company": "Airbus", "job_title": "Analyst"}],
                "interests": ["Chess", "Skydiving"]
            }
        }))
        .unwrap();
        let records = audit_documents(&engine(), &reference, &extracted).await;
        let interests = &records
            .iter()
            .find(|r| r.verdict.category == Category::Interests)
            .unwrap()
            .verdict;
        assert_eq!(interests.error_type, ErrorType::Hallucination);
    }

    #[tokio::test]
    async fn test_cross_section_context_reaches_the_judge() {
        let reference: BTreeMap<String, Value> = serde_json::from_value(json!({
            "cv": {"experiences": [{"company": "Red Cross", "job_title": "Volunteer"},
                                   {"company": "Airbus", "job_title": "Analyst"}]}
        }))
        .unwrap();
        let extracted: BTreeMap<String, Value> = serde_json::from_value(json!({
            "cv_1": {"experiences": [{"company": "Airbus", "job_title": "Analyst"}],
                     "interests": ["Volunteer at the Red Cross"]}
        }))
        .unwrap();
        let records = audit_documents(&engine(), &reference, &extracted).await;
        let experiences = records
            .iter()
            .find(|r| r.verdict.category == Category::Experiences)
            .unwrap();
        assert!(experiences.verdict.coherent, "{}", experiences.verdict.details);
    }

    #[tokio::test]
    async fn test_missing_files_are_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_form_audit(
            &engine(),
            &dir.path().join("ref.json"),
            &dir.path().join("out.json"),
            &dir.path().join("report.json"),
        )
        .await
        .unwrap_err();
        assert!(err.is_skippable());
    }

    #[tokio::test]
    async fn test_run_form_audit_writes_flattened_records() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({"cv": {"interests": ["Chess"]}});
        std::fs::write(dir.path().join("ref.json"), doc.to_string()).unwrap();
        std::fs::write(dir.path().join("out.json"), doc.to_string()).unwrap();
        let report = dir.path().join("report.json");
        run_form_audit(&engine(), &dir.path().join("ref.json"), &dir.path().join("out.json"), &report)
            .await
            .unwrap();
        let written: Vec<Value> = read_json(&report).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0]["reference_used"], "cv");
        assert_eq!(written[0]["dimension"], "Extraction");
    }
}
