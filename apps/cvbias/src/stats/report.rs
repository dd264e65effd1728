//! Run-level statistics report (`stats_<run>.json`), its console summary, and the
//! error listing (`errors.json`).

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::AppError;
use crate::join::cv_id::cv_sort_key;
use crate::models::{Category, Dimension, ErrorType};
use crate::stats::aggregate::{
    analyze_dimensions, analyze_sections, error_type_breakdown, AnalysisOptions, DimensionAnalysis,
    ErrorTypeBreakdown, SectionStat,
};
use crate::stats::corpus::VerdictCorpus;
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub run: String,
    pub generated_at: String,
    pub files: usize,
    pub verdicts: usize,
    pub cvs: usize,
    pub excluded_verdicts: usize,
    pub analysis: DimensionAnalysis,
    pub sections: Vec<SectionStat>,
    pub error_types: ErrorTypeBreakdown,
}

pub fn build_report(corpus: &VerdictCorpus, dimensions: &[Dimension], options: &AnalysisOptions) -> StatsReport {
    StatsReport {
        run: corpus.run.clone(),
        generated_at: now_utc_string(),
        files: corpus.files.len(),
        verdicts: corpus.verdicts.len(),
        cvs: corpus.cv_count(),
        excluded_verdicts: corpus.excluded,
        analysis: analyze_dimensions(&corpus.verdicts, dimensions, options),
        sections: analyze_sections(&corpus.verdicts, dimensions, options.empty_list),
        error_types: error_type_breakdown(&corpus.verdicts, options.empty_list),
    }
}

pub fn stats_path(output_root: &Path, run: &str) -> PathBuf {
    output_root.join(run).join(format!("stats_{run}.json"))
}

pub fn errors_path(output_root: &Path, run: &str) -> PathBuf {
    output_root.join(run).join("errors.json")
}

impl StatsReport {
    pub fn write(&self, output_root: &Path) -> Result<PathBuf, AppError> {
        let path = stats_path(output_root, &self.run);
        write_json_pretty(&path, self)?;
        Ok(path)
    }

    /// Plain-text tables for the terminal.
    pub fn summary(&self) -> String {
        let analysis = &self.analysis;
        let mut out = String::new();
        out.push_str(&format!(
            "Run {}: {} verdicts over {} CVs from {} files ({} excluded)\n\n",
            self.run, self.verdicts, self.cvs, self.files, self.excluded_verdicts
        ));
        out.push_str(&format!(
            "{:<10} {:>7} {:>7} {:>8} {:>17} {:>9} {:>9} {:>7} {:>7}  {}\n",
            "dimension", "errors", "total", "rate %", "95% CI %", "p", "p adj", "h", "power", "verdict"
        ));
        for d in &analysis.dimensions {
            out.push_str(&format!(
                "{:<10} {:>7} {:>7} {:>8.2} {:>7.2} - {:>7.2} {:>9.4} {:>9.4} {:>7.3} {:>7}  {}\n",
                d.dimension.as_str(),
                d.errors,
                d.total,
                d.rate_pct,
                d.ci_low_pct,
                d.ci_high_pct,
                d.p_value,
                d.p_value_adj,
                d.cohens_h,
                d.power.map(|p| format!("{p:.3}")).unwrap_or_else(|| "n/a".to_string()),
                d.significance.label(),
            ));
        }
        out.push_str(&format!(
            "\nalpha {} corrected to {:.4}; background noise {:.2}%; empty lists: {:?}\n",
            analysis.alpha, analysis.alpha_adj, analysis.noise_rate_pct, analysis.empty_list_policy
        ));
        let failures: usize = analysis.dimensions.iter().map(|d| d.judge_failures).sum();
        if failures > 0 {
            out.push_str(&format!("{failures} judge failures excluded from every rate\n"));
        }

        if !self.sections.is_empty() {
            out.push_str("\nrate % by section\n");
            for s in &self.sections {
                out.push_str(&format!(
                    "  {:<12} {:<8} {:>6.2} ({}/{})\n",
                    s.category.as_str(),
                    s.dimension.as_str(),
                    s.rate_pct,
                    s.errors,
                    s.total
                ));
            }
        }

        if !self.error_types.counts.is_empty() {
            out.push_str("\nerror types\n");
            for (dimension, by_type) in &self.error_types.counts {
                let cells: Vec<String> = by_type.iter().map(|(t, n)| format!("{t}={n}")).collect();
                out.push_str(&format!("  {:<8} {}\n", dimension.as_str(), cells.join(" ")));
            }
            if let Some(chi) = &self.error_types.independence {
                out.push_str(&format!(
                    "  chi2 = {:.2}, dof = {}, p = {:.4}\n",
                    chi.statistic, chi.dof, chi.p_value
                ));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub run: String,
    pub dimension: Dimension,
    pub category: Category,
    pub cv_id: String,
    pub error_type: ErrorType,
    pub details: String,
    pub empty_list: bool,
}

/// Every non-coherent verdict, judge failures included, in dimension/category/CV order.
pub fn error_records(corpus: &VerdictCorpus) -> Vec<ErrorRecord> {
    let mut records: Vec<ErrorRecord> = corpus
        .verdicts
        .iter()
        .filter(|v| !v.coherent)
        .map(|v| ErrorRecord {
            run: corpus.run.clone(),
            dimension: v.dimension,
            category: v.category,
            cv_id: v.cv_id.clone(),
            error_type: v.error_type,
            details: v.details.clone(),
            empty_list: v.empty_list,
        })
        .collect();
    records.sort_by(|a, b| {
        (a.dimension, a.category)
            .cmp(&(b.dimension, b.category))
            .then_with(|| cv_sort_key(&a.cv_id).cmp(&cv_sort_key(&b.cv_id)))
    });
    records
}

pub fn write_errors(corpus: &VerdictCorpus, output_root: &Path) -> Result<(PathBuf, usize), AppError> {
    let records = error_records(corpus);
    let path = errors_path(output_root, &corpus.run);
    write_json_pretty(&path, &records)?;
    Ok((path, records.len()))
}
