/// Bonferroni correction over `k = p_values.len()` simultaneous tests.
/// Returns `(alpha / k, [min(p·k, 1)])`; with no tests, `alpha` is returned unchanged.
pub fn bonferroni_adjust(p_values: &[f64], alpha: f64) -> (f64, Vec<f64>) {
    let k = p_values.len();
    if k == 0 {
        return (alpha, Vec::new());
    }
    let k_f = k as f64;
    let adjusted = p_values.iter().map(|p| (p * k_f).min(1.0)).collect();
    (alpha / k_f, adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_dimensions() {
        let (alpha, adjusted) = bonferroni_adjust(&[0.01, 0.02, 0.5], 0.05);
        assert!((alpha - 0.05 / 3.0).abs() < 1e-12);
        let expected = [0.03, 0.06, 1.0];
        for (got, want) in adjusted.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn test_no_tests() {
        assert_eq!(bonferroni_adjust(&[], 0.05), (0.05, Vec::new()));
    }
}
