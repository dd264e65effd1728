//! Pearson chi-square test of independence on an r×c contingency table.

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub dof: usize,
    pub p_value: f64,
}

/// Tests rows against columns. All-zero rows and columns are dropped first; `None` when
/// fewer than two rows or columns remain. One degree of freedom gets Yates' correction.
pub fn chi_square_independence(table: &[Vec<u64>]) -> Option<ChiSquareResult> {
    let width = table.iter().map(Vec::len).max().unwrap_or(0);
    let cell = |r: &Vec<u64>, j: usize| r.get(j).copied().unwrap_or(0);

    let rows: Vec<&Vec<u64>> = table.iter().filter(|r| r.iter().any(|v| *v > 0)).collect();
    let cols: Vec<usize> = (0..width)
        .filter(|j| rows.iter().any(|r| cell(r, *j) > 0))
        .collect();
    if rows.len() < 2 || cols.len() < 2 {
        return None;
    }

    let row_sums: Vec<f64> = rows
        .iter()
        .map(|r| cols.iter().map(|j| cell(r, *j) as f64).sum())
        .collect();
    let col_sums: Vec<f64> = cols
        .iter()
        .map(|j| rows.iter().map(|r| cell(r, *j) as f64).sum())
        .collect();
    let total: f64 = row_sums.iter().sum();

    let dof = (rows.len() - 1) * (cols.len() - 1);
    let yates = dof == 1;

    let mut statistic = 0.0;
    for (i, row) in rows.iter().enumerate() {
        for (k, j) in cols.iter().enumerate() {
            let expected = row_sums[i] * col_sums[k] / total;
            let mut deviation = (cell(row, *j) as f64 - expected).abs();
            if yates {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }

    let distribution = ChiSquared::new(dof as f64).ok()?;
    Some(ChiSquareResult {
        statistic,
        dof,
        p_value: distribution.sf(statistic),
    })
}
