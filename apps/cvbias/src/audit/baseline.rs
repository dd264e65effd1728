//! A/A baseline: audits Original against itself to measure the judge's own
//! false-positive rate. Fast paths are off, so every pair reaches the judge.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::policy::Policy;
use crate::audit::runner::{audit_sets, load_category_table, variant_sets};
use crate::errors::AppError;
use crate::models::{AuditVerdict, Category, Dimension, VariantLabel};
use crate::state::AppState;
use crate::util::{now_utc_string, write_json_pretty};

pub const DEFAULT_SAMPLE_PER_CATEGORY: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct AaDimensionSummary {
    pub dimension: Dimension,
    pub comparisons: usize,
    pub false_positives: usize,
    pub judge_failures: usize,
    pub noise_rate_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AaReport {
    pub run: String,
    pub generated_at: String,
    pub judge: String,
    pub sample_per_category: usize,
    pub comparisons: usize,
    pub false_positives: usize,
    pub judge_failures: usize,
    /// False positives over judged comparisons, in percent. Judge failures are excluded.
    pub noise_rate_pct: f64,
    pub by_dimension: Vec<AaDimensionSummary>,
    pub verdicts: Vec<AuditVerdict>,
}

fn noise_rate_pct(false_positives: usize, judged: usize) -> f64 {
    if judged == 0 {
        0.0
    } else {
        false_positives as f64 / judged as f64 * 100.0
    }
}

fn summarize<'a>(dimension: Dimension, verdicts: impl Iterator<Item = &'a AuditVerdict>) -> AaDimensionSummary {
    let mut summary = AaDimensionSummary {
        dimension,
        comparisons: 0,
        false_positives: 0,
        judge_failures: 0,
        noise_rate_pct: 0.0,
    };
    for verdict in verdicts {
        summary.comparisons += 1;
        if verdict.is_judge_failure() {
            summary.judge_failures += 1;
        } else if verdict.is_error() {
            summary.false_positives += 1;
        }
    }
    summary.noise_rate_pct =
        noise_rate_pct(summary.false_positives, summary.comparisons - summary.judge_failures);
    summary
}

pub fn report_path(output_root: &Path, run: &str) -> PathBuf {
    output_root.join("baseline_aa").join(run).join("report_aa.json")
}

/// Runs the A/A test on the first `sample` CVs (numeric order) of each category that have
/// a non-empty Original, once per dimension policy.
pub async fn run_baseline(
    state: &AppState,
    join_root: &Path,
    output_root: &Path,
    run: &str,
    dimensions: &[Dimension],
    sample: usize,
) -> Result<AaReport, AppError> {
    let engine = state.engine().without_fast_paths();
    let mut verdicts = Vec::new();
    let mut found_input = false;

    for category in Category::ALL {
        let table = match load_category_table(join_root, run, category) {
            Ok(table) => table,
            Err(e) if e.is_skippable() => {
                warn!(run, category = %category, error = %e, "skipping category");
                continue;
            }
            Err(e) => return Err(e),
        };
        found_input = true;

        let sample_sets: Vec<_> = variant_sets(&table)
            .into_iter()
            .filter(|s| !s.original().is_empty())
            .take(sample)
            .collect();

        for dimension in dimensions {
            let policy = Policy::for_dimension(*dimension);
            let batch = audit_sets(
                &engine,
                &sample_sets,
                category,
                VariantLabel::Original,
                &policy,
                state.config.concurrency,
            )
            .await;
            for verdict in batch.iter().filter(|v| v.is_error()) {
                warn!(
                    run,
                    cv_id = %verdict.cv_id,
                    dimension = %dimension,
                    category = %category,
                    "A/A false positive"
                );
            }
            verdicts.extend(batch);
        }
    }

    if !found_input {
        return Err(AppError::MissingInput {
            run: run.to_string(),
            path: join_root.join(run),
        });
    }

    let by_dimension: Vec<AaDimensionSummary> = dimensions
        .iter()
        .map(|d| summarize(*d, verdicts.iter().filter(|v| v.dimension == *d)))
        .collect();
    let comparisons: usize = by_dimension.iter().map(|d| d.comparisons).sum();
    let false_positives: usize = by_dimension.iter().map(|d| d.false_positives).sum();
    let judge_failures: usize = by_dimension.iter().map(|d| d.judge_failures).sum();

    let report = AaReport {
        run: run.to_string(),
        generated_at: now_utc_string(),
        judge: engine.judge_name().to_string(),
        sample_per_category: sample,
        comparisons,
        false_positives,
        judge_failures,
        noise_rate_pct: noise_rate_pct(false_positives, comparisons - judge_failures),
        by_dimension,
        verdicts,
    };

    let path = report_path(output_root, run);
    write_json_pretty(&path, &report)?;
    info!(
        run,
        comparisons = report.comparisons,
        false_positives = report.false_positives,
        noise_rate_pct = report.noise_rate_pct,
        path = %path.display(),
        "A/A baseline written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::judge::{JudgeError, JudgeRequest, RawVerdict, SemanticJudge};
    use crate::config::Config;
    use crate::models::ErrorType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;

    /// Flags every CV whose id ends in 3.
    struct NoisyJudge;

    #[async_trait]
    impl SemanticJudge for NoisyJudge {
        async fn judge(&self, request: &JudgeRequest<'_>) -> Result<RawVerdict, JudgeError> {
            assert_eq!(request.original, request.variant);
            let noisy = request.cv_id.ends_with('3');
            Ok(RawVerdict {
                coherent: !noisy,
                empty_list: false,
                error_type: if noisy { ErrorType::Modification } else { ErrorType::None },
                details: String::new(),
            })
        }

        fn name(&self) -> &'static str {
            "noisy"
        }
    }

    fn join_fixture(root: &Path) {
        let dir = root.join("run1");
        fs::create_dir_all(&dir).unwrap();
        let table: serde_json::Map<String, serde_json::Value> = (1..=5)
            .map(|i| (format!("CV{i}"), json!({"Original": [format!("Hobby {i}")]})))
            .chain(std::iter::once(("CV9".to_string(), json!({"Original": []}))))
            .collect();
        fs::write(dir.join("interests.json"), serde_json::Value::Object(table).to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_rule_judge_has_no_noise_on_identical_pairs() {
        let dir = tempfile::tempdir().unwrap();
        join_fixture(dir.path());
        let state = AppState::from_config(Config::default()).unwrap();
        let report = run_baseline(&state, dir.path(), dir.path(), "run1", &Dimension::BIAS, 20)
            .await
            .unwrap();
        assert_eq!(report.comparisons, 15);
        assert_eq!(report.false_positives, 0);
        assert!(report_path(dir.path(), "run1").exists());
    }

    #[tokio::test]
    async fn test_noise_rate_counts_false_positives_within_sample() {
        let dir = tempfile::tempdir().unwrap();
        join_fixture(dir.path());
        let state = AppState::with_judge(Config::default(), Arc::new(NoisyJudge));
        let report = run_baseline(&state, dir.path(), dir.path(), "run1", &[Dimension::Gender], 4)
            .await
            .unwrap();
        assert_eq!(report.comparisons, 4);
        assert_eq!(report.false_positives, 1);
        assert!((report.noise_rate_pct - 25.0).abs() < 1e-9);
        assert_eq!(report.by_dimension[0].false_positives, 1);
    }
}
