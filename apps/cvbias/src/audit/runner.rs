//! Batch runner: audits every CV of a joined run for one dimension with a bounded number
//! of judge calls in flight, then persists `audit_<dimension>_<category>.json`.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::engine::AuditEngine;
use crate::audit::policy::Policy;
use crate::errors::AppError;
use crate::join::cv_id::cv_sort_key;
use crate::models::{AuditVerdict, Category, CategoryTable, Dimension, VariantLabel, VariantSet};
use crate::state::AppState;
use crate::util::{read_json, write_json_pretty};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run: String,
    pub dimension: Dimension,
    pub files: Vec<PathBuf>,
    pub verdicts: usize,
    pub errors: usize,
    pub judge_failures: usize,
}

pub fn audit_file_name(dimension: Dimension, category: Category) -> String {
    format!("audit_{}_{}.json", dimension.slug(), category.as_str())
}

/// Loads `<join_root>/<run>/<category>.json`.
pub fn load_category_table(join_root: &Path, run: &str, category: Category) -> Result<CategoryTable, AppError> {
    let path = join_root.join(run).join(category.file_name());
    if !path.is_file() {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path,
        });
    }
    read_json(&path)
}

/// Variant sets of a table, in numeric CV order.
pub fn variant_sets(table: &CategoryTable) -> Vec<VariantSet> {
    let mut sets: Vec<VariantSet> = table
        .iter()
        .map(|(cv_id, row)| VariantSet::from_table_row(cv_id, row))
        .collect();
    sets.sort_by_key(|s| cv_sort_key(&s.cv_id));
    sets
}

/// Audits `label` against `Original` for every set. Verdicts come back in numeric CV order.
pub async fn audit_sets(
    engine: &AuditEngine,
    sets: &[VariantSet],
    category: Category,
    label: VariantLabel,
    policy: &Policy,
    concurrency: usize,
) -> Vec<AuditVerdict> {
    let mut verdicts: Vec<AuditVerdict> = stream::iter(sets)
        .map(|set| engine.audit(category, set.original(), set.get(label), policy, &set.cv_id))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    verdicts.sort_by_key(|v| cv_sort_key(&v.cv_id));
    verdicts
}

pub async fn audit_run(
    state: &AppState,
    join_root: &Path,
    output_root: &Path,
    run: &str,
    dimension: Dimension,
) -> Result<RunSummary, AppError> {
    let label = dimension.variant_label().ok_or_else(|| {
        AppError::Validation(format!("{dimension} has no demographic variant to audit"))
    })?;
    let policy = Policy::for_dimension(dimension);
    let engine = state.engine();

    let mut summary = RunSummary {
        run: run.to_string(),
        dimension,
        files: Vec::new(),
        verdicts: 0,
        errors: 0,
        judge_failures: 0,
    };

    for category in Category::ALL {
        let table = match load_category_table(join_root, run, category) {
            Ok(table) => table,
            Err(e) if e.is_skippable() => {
                warn!(run, category = %category, error = %e, "skipping category");
                continue;
            }
            Err(e) => return Err(e),
        };

        let sets = variant_sets(&table);
        let verdicts =
            audit_sets(&engine, &sets, category, label, &policy, state.config.concurrency).await;

        let errors = verdicts.iter().filter(|v| v.is_error()).count();
        let failures = verdicts.iter().filter(|v| v.is_judge_failure()).count();
        let path = output_root.join(run).join(audit_file_name(dimension, category));
        write_json_pretty(&path, &verdicts)?;

        info!(
            run,
            dimension = %dimension,
            category = %category,
            cvs = verdicts.len(),
            errors,
            judge_failures = failures,
            judge = engine.judge_name(),
            path = %path.display(),
            "audit written"
        );

        summary.verdicts += verdicts.len();
        summary.errors += errors;
        summary.judge_failures += failures;
        summary.files.push(path);
    }

    if summary.files.is_empty() {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path: join_root.join(run),
        });
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::ErrorType;
    use serde_json::json;
    use std::fs;

    fn write_join(root: &Path, run: &str, category: Category, value: serde_json::Value) {
        let dir = root.join(run);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(category.file_name()), value.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_audit_run_writes_sorted_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let join_root = dir.path().join("joined");
        let output_root = dir.path().join("audits");
        write_join(
            &join_root,
            "run1",
            Category::Studies,
            json!({
                "CV10": {"Original": [{"level_of_degree": "Master"}], "Age": [{"level_of_degree": "PhD"}]},
                "CV2": {"Original": [{"level_of_degree": "Master"}], "Age": []},
                "CV1": {"Original": [{"level_of_degree": "Master", "dates": "2015-2019"}],
                        "Age": [{"level_of_degree": "Master", "dates": "2019"}]}
            }),
        );

        let state = AppState::from_config(Config::default()).unwrap();
        let summary = audit_run(&state, &join_root, &output_root, "run1", Dimension::Age)
            .await
            .unwrap();
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.verdicts, 3);
        assert_eq!(summary.errors, 2);

        let verdicts: Vec<AuditVerdict> =
            read_json(&output_root.join("run1/audit_age_studies.json")).unwrap();
        let ids: Vec<&str> = verdicts.iter().map(|v| v.cv_id.as_str()).collect();
        assert_eq!(ids, vec!["CV1", "CV2", "CV10"]);
        assert!(verdicts[0].coherent);
        assert!(verdicts[1].empty_list);
        assert_eq!(verdicts[2].error_type, ErrorType::Modification);
    }

    #[tokio::test]
    async fn test_missing_run_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(Config::default()).unwrap();
        let err = audit_run(&state, dir.path(), dir.path(), "run4", Dimension::Gender)
            .await
            .unwrap_err();
        assert!(err.is_skippable());
        assert!(err.to_string().contains("run4"));
    }

    #[tokio::test]
    async fn test_extraction_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(Config::default()).unwrap();
        let err = audit_run(&state, dir.path(), dir.path(), "run1", Dimension::Extraction)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
