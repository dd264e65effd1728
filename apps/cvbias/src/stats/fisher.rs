//! Two-sided Fisher exact test on 2×2 tables.

use statrs::function::factorial::ln_binomial;

/// Relative tolerance when collecting tables "as or more extreme" than the observed one.
const RELATIVE_TOLERANCE: f64 = 1e-7;

/// Two-sided p-value for `[[a, b], [c, d]]`: the total probability, under fixed margins,
/// of every table no more likely than the observed one. Returns 1.0 for an empty table.
pub fn fisher_exact_2x2(a: u64, b: u64, c: u64, d: u64) -> f64 {
    let row1 = a + b;
    let row2 = c + d;
    let col1 = a + c;
    let n = row1 + row2;
    if n == 0 {
        return 1.0;
    }

    let ln_total = ln_binomial(n, col1);
    let ln_prob = |x: u64| ln_binomial(row1, x) + ln_binomial(row2, col1 - x) - ln_total;

    let observed = ln_prob(a).exp();
    let threshold = observed * (1.0 + RELATIVE_TOLERANCE);
    let low = col1.saturating_sub(row2);
    let high = row1.min(col1);

    let p: f64 = (low..=high)
        .map(|x| ln_prob(x).exp())
        .filter(|p| *p <= threshold)
        .sum();
    p.min(1.0)
}

/// Observed error count against a theoretical error-free baseline of the same size:
/// `[[errors, 0], [total - errors, total]]`. Returns 1.0 when `total == 0`.
pub fn fisher_exact_vs_zero(errors: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    let errors = errors.min(total) as u64;
    let total = total as u64;
    fisher_exact_2x2(errors, 0, total - errors, total)
}
