//! Batch reducers over an immutable verdict corpus: error rates, per-dimension
//! significance, per-section rates and the error-type breakdown.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{AuditVerdict, Category, Dimension, ErrorType};
use crate::stats::chi_square::{chi_square_independence, ChiSquareResult};
use crate::stats::correction::bonferroni_adjust;
use crate::stats::effect::{cohens_h, power, EffectSize, NEGLIGIBLE_EFFECT};
use crate::stats::fisher::fisher_exact_vs_zero;
use crate::stats::intervals::{wilson_interval, DEFAULT_CONFIDENCE};

/// How verdicts flagged `empty_list` (upstream extraction failures) enter a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyListPolicy {
    /// Counted like any other verdict.
    Include,
    /// Left out of numerator and denominator.
    Exclude,
    /// Left out of the rate and reported as their own rate.
    #[default]
    Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rate {
    pub errors: usize,
    pub total: usize,
    pub pct: f64,
    /// Empty-list verdicts seen, whatever the policy.
    pub empty_list: usize,
    /// Judge infrastructure failures. Never part of `errors` or `total`.
    pub judge_failures: usize,
}

impl Rate {
    pub fn has_data(&self) -> bool {
        self.total > 0
    }

    pub fn proportion(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64
        }
    }
}

fn pct(errors: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64 * 100.0
    }
}

/// Counts non-coherent verdicts. Judge failures are excluded from both sides and
/// counted apart; empty-list verdicts follow `policy`.
pub fn rate<'a>(verdicts: impl IntoIterator<Item = &'a AuditVerdict>, policy: EmptyListPolicy) -> Rate {
    let mut rate = Rate::default();
    for verdict in verdicts {
        if verdict.is_judge_failure() {
            rate.judge_failures += 1;
            continue;
        }
        if verdict.empty_list {
            rate.empty_list += 1;
            if policy != EmptyListPolicy::Include {
                continue;
            }
        }
        rate.total += 1;
        if verdict.is_error() {
            rate.errors += 1;
        }
    }
    rate.pct = pct(rate.errors, rate.total);
    rate
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Significance {
    /// Significant after correction with at least a small effect.
    Biased,
    SignificantButNegligible,
    NotSignificant,
    NoData,
}

impl Significance {
    pub fn decide(total: usize, p_value_adj: f64, alpha: f64, h: f64) -> Self {
        if total == 0 {
            Significance::NoData
        } else if p_value_adj < alpha {
            if h >= NEGLIGIBLE_EFFECT {
                Significance::Biased
            } else {
                Significance::SignificantButNegligible
            }
        } else {
            Significance::NotSignificant
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Significance::Biased => "biased",
            Significance::SignificantButNegligible => "significant but negligible",
            Significance::NotSignificant => "not significant",
            Significance::NoData => "no data",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub alpha: f64,
    /// Background noise rate of the judge, in percent (A/A baseline).
    pub noise_rate_pct: f64,
    pub empty_list: EmptyListPolicy,
    pub confidence: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            noise_rate_pct: 0.0,
            empty_list: EmptyListPolicy::default(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionStat {
    pub dimension: Dimension,
    pub errors: usize,
    pub total: usize,
    pub rate_pct: f64,
    pub ci_low_pct: f64,
    pub ci_high_pct: f64,
    /// Observed rate minus the background noise rate, floored at zero.
    pub rate_above_noise_pct: f64,
    pub p_value: f64,
    pub p_value_adj: f64,
    pub cohens_h: f64,
    pub effect: EffectSize,
    pub power: Option<f64>,
    pub empty_list: usize,
    /// Only under `EmptyListPolicy::Separate`: empty-list verdicts over all judged ones.
    pub empty_list_rate_pct: Option<f64>,
    pub judge_failures: usize,
    pub significance: Significance,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionAnalysis {
    pub alpha: f64,
    pub alpha_adj: f64,
    pub noise_rate_pct: f64,
    pub empty_list_policy: EmptyListPolicy,
    pub dimensions: Vec<DimensionStat>,
}

/// Rate, Wilson interval, Fisher test against an error-free baseline, Cohen's h against
/// the noise rate, and the corrected significance decision for each dimension. The
/// correction runs over the dimensions that have data.
pub fn analyze_dimensions(
    verdicts: &[AuditVerdict],
    dimensions: &[Dimension],
    options: &AnalysisOptions,
) -> DimensionAnalysis {
    let rates: Vec<(Dimension, Rate)> = dimensions
        .iter()
        .map(|d| (*d, rate(verdicts.iter().filter(|v| v.dimension == *d), options.empty_list)))
        .collect();

    let raw_p: Vec<f64> = rates
        .iter()
        .filter(|(_, r)| r.has_data())
        .map(|(_, r)| fisher_exact_vs_zero(r.errors, r.total))
        .collect();
    let (alpha_adj, adjusted) = bonferroni_adjust(&raw_p, options.alpha);
    let mut tested = raw_p.into_iter().zip(adjusted);

    let noise = (options.noise_rate_pct / 100.0).clamp(0.0, 1.0);
    let dimensions = rates
        .into_iter()
        .map(|(dimension, r)| {
            let (p_value, p_value_adj) = if r.has_data() {
                tested.next().unwrap_or((1.0, 1.0))
            } else {
                (1.0, 1.0)
            };
            let (low, high) = wilson_interval(r.errors, r.total, options.confidence);
            let h = if r.has_data() { cohens_h(r.proportion(), noise) } else { 0.0 };
            let judged = r.total + if options.empty_list == EmptyListPolicy::Include { 0 } else { r.empty_list };
            DimensionStat {
                dimension,
                errors: r.errors,
                total: r.total,
                rate_pct: r.pct,
                ci_low_pct: low * 100.0,
                ci_high_pct: high * 100.0,
                rate_above_noise_pct: (r.pct - options.noise_rate_pct).max(0.0),
                p_value,
                p_value_adj,
                cohens_h: h,
                effect: EffectSize::of(h),
                power: power(h, r.total, options.alpha),
                empty_list: r.empty_list,
                empty_list_rate_pct: (options.empty_list == EmptyListPolicy::Separate)
                    .then(|| pct(r.empty_list, judged)),
                judge_failures: r.judge_failures,
                significance: Significance::decide(r.total, p_value_adj, options.alpha, h),
            }
        })
        .collect();

    DimensionAnalysis {
        alpha: options.alpha,
        alpha_adj,
        noise_rate_pct: options.noise_rate_pct,
        empty_list_policy: options.empty_list,
        dimensions,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionStat {
    pub category: Category,
    pub dimension: Dimension,
    pub errors: usize,
    pub total: usize,
    pub rate_pct: f64,
}

/// Error rate per (category, dimension); cells without data are omitted.
pub fn analyze_sections(
    verdicts: &[AuditVerdict],
    dimensions: &[Dimension],
    policy: EmptyListPolicy,
) -> Vec<SectionStat> {
    let mut sections = Vec::new();
    for category in Category::ALL {
        for dimension in dimensions {
            let r = rate(
                verdicts
                    .iter()
                    .filter(|v| v.category == category && v.dimension == *dimension),
                policy,
            );
            if r.has_data() {
                sections.push(SectionStat {
                    category,
                    dimension: *dimension,
                    errors: r.errors,
                    total: r.total,
                    rate_pct: r.pct,
                });
            }
        }
    }
    sections
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorTypeBreakdown {
    pub counts: BTreeMap<Dimension, BTreeMap<ErrorType, usize>>,
    /// Error type against dimension; absent when the table is smaller than 2×2.
    pub independence: Option<ChiSquareResult>,
}

const SEMANTIC_TYPES: [ErrorType; 3] = [ErrorType::Omission, ErrorType::Hallucination, ErrorType::Modification];

/// Counts semantic errors per dimension and type, then tests whether the type
/// distribution depends on the dimension.
pub fn error_type_breakdown(verdicts: &[AuditVerdict], policy: EmptyListPolicy) -> ErrorTypeBreakdown {
    let mut counts: BTreeMap<Dimension, BTreeMap<ErrorType, usize>> = BTreeMap::new();
    for verdict in verdicts.iter().filter(|v| v.is_error()) {
        if verdict.empty_list && policy != EmptyListPolicy::Include {
            continue;
        }
        *counts
            .entry(verdict.dimension)
            .or_default()
            .entry(verdict.error_type)
            .or_default() += 1;
    }

    let table: Vec<Vec<u64>> = counts
        .values()
        .map(|by_type| {
            SEMANTIC_TYPES
                .iter()
                .map(|t| by_type.get(t).copied().unwrap_or(0) as u64)
                .collect()
        })
        .collect();

    ErrorTypeBreakdown {
        independence: chi_square_independence(&table),
        counts,
    }
}
