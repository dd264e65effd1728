//! Loads the persisted verdict corpus of a run and applies the CV exclusion list.
//!
//! Verdict files are `audit_<dimension>_<category>.json`, either directly in the run
//! directory or one level down (older runs kept one sub-directory per dimension).
//! Dimension and category always come from the file name.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::join::canonical_cv_id;
use crate::models::{AuditVerdict, Category, Dimension, ErrorType};
use crate::util::read_json;

pub const EXCLUSIONS_FILE: &str = "cv_exclusions.json";

fn verdict_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^audit_([A-Za-z]+)_([A-Za-z_]+)\.json$").expect("static regex is valid")
    })
}

/// Normalizes an id from a verdict file or the exclusion list: bare numbers become `CV<n>`.
pub fn normalize_cv_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<u64>() {
        Ok(n) => format!("CV{n}"),
        Err(_) => canonical_cv_id(trimmed),
    }
}

/// Lenient on-disk shape; older files carry `empty_extraction` and lowercase types.
/// The type label stays raw so one unknown label costs one row, not the file.
#[derive(Debug, Deserialize)]
struct StoredVerdict {
    #[serde(deserialize_with = "id_as_string")]
    cv_id: String,
    coherent: bool,
    #[serde(default, alias = "empty_extraction")]
    empty_list: bool,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    details: String,
}

fn id_as_string<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

impl StoredVerdict {
    /// `Err` carries the label when an incoherent row names no known type.
    fn into_verdict(self, dimension: Dimension, category: Category) -> Result<AuditVerdict, String> {
        let error_type = if self.coherent {
            ErrorType::None
        } else {
            let raw = self.error_type.unwrap_or_default();
            match ErrorType::parse_lenient(&raw) {
                Some(t) => t,
                None => return Err(raw),
            }
        };
        Ok(AuditVerdict {
            cv_id: normalize_cv_id(&self.cv_id),
            dimension,
            category,
            coherent: self.coherent,
            empty_list: self.empty_list,
            error_type,
            details: self.details,
        })
    }
}

/// Parses each row on its own. Rows that do not parse are warned and dropped.
fn parse_rows(
    run: &str,
    path: &Path,
    rows: Vec<serde_json::Value>,
    dimension: Dimension,
    category: Category,
) -> Vec<AuditVerdict> {
    let mut verdicts = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let parsed = serde_json::from_value::<StoredVerdict>(row)
            .map_err(|e| e.to_string())
            .and_then(|s| {
                s.into_verdict(dimension, category)
                    .map_err(|label| format!("unknown error_type '{label}'"))
            });
        match parsed {
            Ok(verdict) => verdicts.push(verdict),
            Err(reason) => {
                warn!(run, path = %path.display(), row = index, %reason, "skipping verdict row");
            }
        }
    }
    verdicts
}

#[derive(Debug, Clone)]
pub struct VerdictCorpus {
    pub run: String,
    pub files: Vec<PathBuf>,
    pub verdicts: Vec<AuditVerdict>,
    /// Verdicts dropped by the exclusion list.
    pub excluded: usize,
}

impl VerdictCorpus {
    pub fn dimensions(&self) -> BTreeSet<Dimension> {
        self.verdicts.iter().map(|v| v.dimension).collect()
    }

    pub fn cv_count(&self) -> usize {
        self.verdicts
            .iter()
            .map(|v| v.cv_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Drops verdicts of excluded CVs, returning how many were dropped.
    pub fn apply_exclusions(&mut self, excluded: &BTreeSet<String>) -> usize {
        let before = self.verdicts.len();
        self.verdicts.retain(|v| !excluded.contains(&v.cv_id));
        let dropped = before - self.verdicts.len();
        self.excluded += dropped;
        dropped
    }
}

fn classify(path: &Path) -> Option<(Dimension, Category)> {
    let name = path.file_name()?.to_str()?;
    let caps = verdict_file_pattern().captures(name)?;
    let dimension = Dimension::parse(caps.get(1)?.as_str())?;
    let category = Category::parse(caps.get(2)?.as_str())?;
    Some((dimension, category))
}

type VerdictFile = (PathBuf, Dimension, Category);

/// Verdict files directly in `dir`, plus the sub-directories found there.
fn scan_dir(dir: &Path) -> Result<(Vec<VerdictFile>, Vec<PathBuf>), AppError> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| AppError::io(dir, e))? {
        let path = entry.map_err(|e| AppError::io(dir, e))?.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if let Some((dimension, category)) = classify(&path) {
            files.push((path, dimension, category));
        }
    }
    Ok((files, subdirs))
}

fn verdict_files(run_dir: &Path) -> Result<Vec<VerdictFile>, AppError> {
    let (mut files, subdirs) = scan_dir(run_dir)?;
    for sub in subdirs {
        let (nested, _) = scan_dir(&sub)?;
        files.extend(nested);
    }
    files.sort();
    Ok(files)
}

/// Loads every verdict file of `<audit_root>/<run>`. Unreadable files are warned and skipped.
pub fn load_run_verdicts(audit_root: &Path, run: &str) -> Result<VerdictCorpus, AppError> {
    let run_dir = audit_root.join(run);
    if !run_dir.is_dir() {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path: run_dir,
        });
    }

    let mut corpus = VerdictCorpus {
        run: run.to_string(),
        files: Vec::new(),
        verdicts: Vec::new(),
        excluded: 0,
    };
    for (path, dimension, category) in verdict_files(&run_dir)? {
        let rows: Vec<serde_json::Value> = match read_json(&path) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(run, path = %path.display(), error = %e, "skipping unreadable verdict file");
                continue;
            }
        };
        let verdicts = parse_rows(run, &path, rows, dimension, category);
        debug!(run, path = %path.display(), verdicts = verdicts.len(), "verdict file loaded");
        corpus.verdicts.extend(verdicts);
        corpus.files.push(path);
    }

    if corpus.files.is_empty() {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path: run_dir,
        });
    }
    Ok(corpus)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExclusionFile {
    Global(Vec<serde_json::Value>),
    PerRun(BTreeMap<String, Vec<serde_json::Value>>),
}

/// CV ids to drop before aggregation: one list for every run, or a list per run.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    global: BTreeSet<String>,
    per_run: BTreeMap<String, BTreeSet<String>>,
}

fn id_set(values: Vec<serde_json::Value>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => normalize_cv_id(&s),
            other => normalize_cv_id(&other.to_string()),
        })
        .collect()
}

impl Exclusions {
    /// A missing file means no exclusions.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.is_file() {
            debug!(path = %path.display(), "no exclusion list");
            return Ok(Self::default());
        }
        Ok(match read_json::<ExclusionFile>(path)? {
            ExclusionFile::Global(ids) => Self {
                global: id_set(ids),
                per_run: BTreeMap::new(),
            },
            ExclusionFile::PerRun(map) => Self {
                global: BTreeSet::new(),
                per_run: map.into_iter().map(|(run, ids)| (run, id_set(ids))).collect(),
            },
        })
    }

    pub fn for_run(&self, run: &str) -> BTreeSet<String> {
        let mut ids = self.global.clone();
        if let Some(run_ids) = self.per_run.get(run) {
            ids.extend(run_ids.iter().cloned());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, value: serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, value.to_string()).unwrap();
    }

    #[test]
    fn test_loads_flat_and_nested_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run1");
        write(
            &run.join("audit_gender_studies.json"),
            json!([{"cv_id": "CV1", "coherent": true, "empty_list": false, "error_type": null, "details": "Consistent"}]),
        );
        write(
            &run.join("Rapport_age/audit_age_interests.json"),
            json!([{"cv_id": 7, "coherent": false, "empty_extraction": true, "error_type": "omission", "details": "empty"}]),
        );
        write(&run.join("notes.json"), json!({"ignored": true}));
        write(&run.join("audit_origin_experiences.json"), json!("not a list"));

        let corpus = load_run_verdicts(dir.path(), "run1").unwrap();
        assert_eq!(corpus.files.len(), 2);
        assert_eq!(corpus.verdicts.len(), 2);

        let age = corpus.verdicts.iter().find(|v| v.dimension == Dimension::Age).unwrap();
        assert_eq!(age.cv_id, "CV7");
        assert_eq!(age.category, Category::Interests);
        assert!(age.empty_list);
        assert_eq!(age.error_type, ErrorType::Omission);
        assert_eq!(corpus.dimensions().len(), 2);
    }

    #[test]
    fn test_unknown_label_drops_only_its_row() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("run1/audit_gender_experiences.json"),
            json!([
                {"cv_id": "CV1", "coherent": false, "error_type": "Omission / Modification", "details": "x"},
                {"cv_id": "CV2", "coherent": false, "error_type": "False positive", "details": "?"},
                {"cv_id": "CV3", "coherent": true, "error_type": "False positive"},
                {"cv_id": "CV4", "coherent": "maybe"},
                {"cv_id": "CV5", "coherent": false, "error_type": "hallucination"}
            ]),
        );
        let corpus = load_run_verdicts(dir.path(), "run1").unwrap();
        assert_eq!(corpus.files.len(), 1);
        let ids: Vec<&str> = corpus.verdicts.iter().map(|v| v.cv_id.as_str()).collect();
        assert_eq!(ids, vec!["CV1", "CV3", "CV5"]);
        assert_eq!(corpus.verdicts[0].error_type, ErrorType::Modification);
        assert_eq!(corpus.verdicts[1].error_type, ErrorType::None);
        assert_eq!(corpus.verdicts[2].error_type, ErrorType::Hallucination);
    }

    #[test]
    fn test_missing_run_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_run_verdicts(dir.path(), "run9").unwrap_err().is_skippable());
        fs::create_dir(dir.path().join("run2")).unwrap();
        assert!(load_run_verdicts(dir.path(), "run2").unwrap_err().is_skippable());
    }

    #[test]
    fn test_exclusions_list_and_per_run_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXCLUSIONS_FILE);

        write(&path, json!(["12", "cv 3", 40]));
        let global = Exclusions::load(&path).unwrap();
        let ids = global.for_run("run1");
        assert!(ids.contains("CV12") && ids.contains("CV3") && ids.contains("CV40"));

        write(&path, json!({"run1": ["CV5"], "run2": [6]}));
        let per_run = Exclusions::load(&path).unwrap();
        assert_eq!(per_run.for_run("run1").into_iter().collect::<Vec<_>>(), vec!["CV5"]);
        assert!(per_run.for_run("run3").is_empty());

        assert!(Exclusions::load(&dir.path().join("absent.json")).unwrap().for_run("run1").is_empty());
    }

    #[test]
    fn test_apply_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("run1/audit_age_studies.json"),
            json!([
                {"cv_id": "CV1", "coherent": true},
                {"cv_id": "CV2", "coherent": false, "error_type": "Modification", "details": "x"}
            ]),
        );
        let mut corpus = load_run_verdicts(dir.path(), "run1").unwrap();
        let dropped = corpus.apply_exclusions(&BTreeSet::from(["CV2".to_string()]));
        assert_eq!(dropped, 1);
        assert_eq!(corpus.cv_count(), 1);
        assert_eq!(corpus.excluded, 1);
    }
}
