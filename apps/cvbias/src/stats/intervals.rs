//! Wilson score interval for a binomial proportion.

use statrs::distribution::{ContinuousCDF, Normal};

pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Two-sided standard-normal critical value for `confidence` (1.96 at 95%).
pub fn z_critical(confidence: f64) -> f64 {
    let tail = (1.0 + confidence.clamp(0.0, 0.999_999)) / 2.0;
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.inverse_cdf(tail),
        Err(_) => 1.959_963_984_540_054,
    }
}

/// Closed-form Wilson interval for `successes` out of `n`, as proportions in `[0, 1]`.
/// Returns `(0, 0)` when `n == 0`.
pub fn wilson_interval(successes: usize, n: usize, confidence: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }
    let successes = successes.min(n);
    let n_f = n as f64;
    let p = successes as f64 / n_f;
    let z = z_critical(confidence);
    let z2 = z * z;

    let denominator = 1.0 + z2 / n_f;
    let center = (p + z2 / (2.0 * n_f)) / denominator;
    let margin = z * ((p * (1.0 - p) + z2 / (4.0 * n_f)) / n_f).sqrt() / denominator;

    // Pin the exact bounds; the closed form only reaches them up to rounding.
    let low = if successes == 0 { 0.0 } else { (center - margin).max(0.0) };
    let high = if successes == n { 1.0 } else { (center + margin).min(1.0) };
    (low, high)
}
