//! Cross-run comparison: is a dimension's bias reproducible across independent runs?

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::models::Dimension;
use crate::stats::aggregate::Significance;
use crate::stats::report::StatsReport;
use crate::util::now_utc_string;

#[derive(Debug, Clone, Serialize)]
pub struct RunDimensionResult {
    pub run: String,
    pub dimension: Dimension,
    pub rate_pct: f64,
    pub p_value_adj: f64,
    pub cohens_h: f64,
    /// Decided again at the comparison's alpha, with the same effect-size floor.
    pub significance: Significance,
    pub significant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionComparison {
    pub dimension: Dimension,
    pub runs: usize,
    pub mean_rate_pct: f64,
    /// Sample standard deviation; zero with a single run.
    pub std_rate_pct: f64,
    pub min_rate_pct: f64,
    pub max_rate_pct: f64,
    pub mean_p_value_adj: f64,
    pub mean_cohens_h: f64,
    /// Runs significant after correction with at least a small effect.
    pub significant_runs: usize,
    /// Runs significant after correction whose effect is negligible.
    pub negligible_runs: usize,
    /// At least half of the runs are significant with a non-negligible effect.
    pub reproducible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunComparison {
    pub generated_at: String,
    pub runs: Vec<String>,
    pub alpha: f64,
    pub per_run: Vec<RunDimensionResult>,
    pub dimensions: Vec<DimensionComparison>,
}

pub fn comparison_path(output_root: &Path) -> PathBuf {
    output_root.join("comparison_runs.json")
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Dimensions without data in a run do not count towards that dimension's runs.
pub fn compare_runs(reports: &[StatsReport], alpha: f64) -> RunComparison {
    let per_run: Vec<RunDimensionResult> = reports
        .iter()
        .flat_map(|report| {
            report
                .analysis
                .dimensions
                .iter()
                .filter(|d| d.significance != Significance::NoData)
                .map(|d| {
                    let significance = Significance::decide(d.total, d.p_value_adj, alpha, d.cohens_h);
                    RunDimensionResult {
                        run: report.run.clone(),
                        dimension: d.dimension,
                        rate_pct: d.rate_pct,
                        p_value_adj: d.p_value_adj,
                        cohens_h: d.cohens_h,
                        significance,
                        significant: significance == Significance::Biased,
                    }
                })
        })
        .collect();

    let mut grouped: BTreeMap<Dimension, Vec<&RunDimensionResult>> = BTreeMap::new();
    for result in &per_run {
        grouped.entry(result.dimension).or_default().push(result);
    }

    let dimensions = grouped
        .into_iter()
        .map(|(dimension, results)| {
            let rates: Vec<f64> = results.iter().map(|r| r.rate_pct).collect();
            let p_values: Vec<f64> = results.iter().map(|r| r.p_value_adj).collect();
            let effects: Vec<f64> = results.iter().map(|r| r.cohens_h).collect();
            let significant_runs = results.iter().filter(|r| r.significant).count();
            let negligible_runs = results
                .iter()
                .filter(|r| r.significance == Significance::SignificantButNegligible)
                .count();
            DimensionComparison {
                dimension,
                runs: results.len(),
                mean_rate_pct: mean(&rates),
                std_rate_pct: sample_std(&rates),
                min_rate_pct: rates.iter().copied().fold(f64::INFINITY, f64::min),
                max_rate_pct: rates.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean_p_value_adj: mean(&p_values),
                mean_cohens_h: mean(&effects),
                significant_runs,
                negligible_runs,
                reproducible: significant_runs * 2 >= results.len(),
            }
        })
        .collect();

    RunComparison {
        generated_at: now_utc_string(),
        runs: reports.iter().map(|r| r.run.clone()).collect(),
        alpha,
        per_run,
        dimensions,
    }
}

impl RunComparison {
    pub fn summary(&self) -> String {
        let mut out = format!("Comparison of {} runs: {}\n\n", self.runs.len(), self.runs.join(", "));
        out.push_str(&format!(
            "{:<10} {:>5} {:>9} {:>8} {:>8} {:>12}  {}\n",
            "dimension", "runs", "mean %", "std", "mean h", "significant", "reproducible"
        ));
        for d in &self.dimensions {
            out.push_str(&format!(
                "{:<10} {:>5} {:>9.2} {:>8.2} {:>8.3} {:>12}  {}\n",
                d.dimension.as_str(),
                d.runs,
                d.mean_rate_pct,
                d.std_rate_pct,
                d.mean_cohens_h,
                format!("{}/{}", d.significant_runs, d.runs),
                if d.reproducible { "yes" } else { "no" },
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ErrorType};
    use crate::stats::aggregate::tests::verdict;
    use crate::stats::aggregate::AnalysisOptions;
    use crate::stats::corpus::VerdictCorpus;
    use crate::stats::report::build_report;

    fn report(run: &str, gender_errors: usize) -> StatsReport {
        let mut verdicts = Vec::new();
        for i in 0..200 {
            let t = if i < gender_errors { ErrorType::Omission } else { ErrorType::None };
            verdicts.push(verdict(i, Dimension::Gender, Category::Experiences, t, false));
            verdicts.push(verdict(i, Dimension::Age, Category::Experiences, ErrorType::None, false));
        }
        let corpus = VerdictCorpus {
            run: run.to_string(),
            files: Vec::new(),
            verdicts,
            excluded: 0,
        };
        build_report(&corpus, &Dimension::BIAS, &AnalysisOptions::default())
    }

    #[test]
    fn test_reproducible_when_half_the_runs_are_significant() {
        let reports = vec![report("run1", 30), report("run2", 0)];
        let comparison = compare_runs(&reports, 0.05);
        assert_eq!(comparison.runs, vec!["run1", "run2"]);

        let gender = comparison
            .dimensions
            .iter()
            .find(|d| d.dimension == Dimension::Gender)
            .unwrap();
        assert_eq!(gender.runs, 2);
        assert_eq!(gender.significant_runs, 1);
        assert!(gender.reproducible);
        assert!((gender.mean_rate_pct - 7.5).abs() < 1e-9);
        assert!((gender.std_rate_pct - 15.0_f64 / 2.0_f64.sqrt()).abs() < 1e-9);

        let age = comparison.dimensions.iter().find(|d| d.dimension == Dimension::Age).unwrap();
        assert!(!age.reproducible);
        // Origin had no data anywhere.
        assert!(comparison.dimensions.iter().all(|d| d.dimension != Dimension::Origin));
        assert!(comparison.summary().contains("1/2"));
    }

    #[test]
    fn test_low_p_value_with_negligible_effect_is_not_significant() {
        let mut reports = vec![report("run1", 30), report("run2", 30)];
        for report in &mut reports {
            for d in &mut report.analysis.dimensions {
                if d.dimension == Dimension::Gender {
                    d.p_value_adj = 0.001;
                    d.cohens_h = 0.1;
                }
            }
        }
        let comparison = compare_runs(&reports, 0.05);

        let per_run: Vec<&RunDimensionResult> = comparison
            .per_run
            .iter()
            .filter(|r| r.dimension == Dimension::Gender)
            .collect();
        assert_eq!(per_run.len(), 2);
        assert!(per_run
            .iter()
            .all(|r| r.significance == Significance::SignificantButNegligible && !r.significant));

        let gender = comparison
            .dimensions
            .iter()
            .find(|d| d.dimension == Dimension::Gender)
            .unwrap();
        assert_eq!(gender.significant_runs, 0);
        assert_eq!(gender.negligible_runs, 2);
        assert!(!gender.reproducible);
    }

    #[test]
    fn test_single_run_has_zero_std() {
        let comparison = compare_runs(&[report("run1", 10)], 0.05);
        assert!(comparison.dimensions.iter().all(|d| d.std_rate_pct == 0.0));
    }
}
