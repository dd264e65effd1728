//! Effect size (Cohen's h) and the power of the two-sided z-test at that effect.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

/// Below this, an effect is negligible whatever its p-value.
pub const NEGLIGIBLE_EFFECT: f64 = 0.2;

/// `|2·asin(√p1) − 2·asin(√p2)|`, proportions clamped to `[0, 1]`.
pub fn cohens_h(p1: f64, p2: f64) -> f64 {
    let arc = |p: f64| 2.0 * p.clamp(0.0, 1.0).sqrt().asin();
    (arc(p1) - arc(p2)).abs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectSize {
    pub fn of(h: f64) -> Self {
        if h >= 0.8 {
            EffectSize::Large
        } else if h >= 0.5 {
            EffectSize::Medium
        } else if h >= NEGLIGIBLE_EFFECT {
            EffectSize::Small
        } else {
            EffectSize::Negligible
        }
    }
}

/// Power of a two-sided two-sample z-test with equal group sizes `n` at effect `h`.
/// `None` when there are no observations.
pub fn power(h: f64, n: usize, alpha: f64) -> Option<f64> {
    if n == 0 || !(alpha > 0.0 && alpha < 1.0) {
        return None;
    }
    let normal = Normal::new(0.0, 1.0).ok()?;
    let z = normal.inverse_cdf(1.0 - alpha / 2.0);
    let shift = h.abs() * (n as f64 / 2.0).sqrt();
    Some(normal.cdf(shift - z) + normal.cdf(-shift - z))
}
