//! Invertible per-column standardization.
//!
//! [`scale`] centers every column on its mean and divides by its sample
//! standard deviation, both taken over the non-`NaN` cells. [`recover`]
//! consumes the recorded [`ScaleParams`] to undo it.

use crate::config::SpreadPolicy;
use crate::error::{ImputeError, Result};
use crate::types::Matrix;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Spreads at or below this are treated as zero.
const MIN_SPREAD: f64 = 1e-12;

/// Per-column `(mean, spread)` recorded by [`scale`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    means: Vec<f64>,
    spreads: Vec<f64>,
}

impl ScaleParams {
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn spreads(&self) -> &[f64] {
        &self.spreads
    }

    pub fn n_cols(&self) -> usize {
        self.means.len()
    }
}

/// Standardize every column of `matrix`.
///
/// `NaN` cells are skipped when computing the statistics and stay `NaN` in
/// the output. A column whose spread is zero (or undefined because it has
/// fewer than two values) is handled by `policy`.
pub fn scale(matrix: &Matrix, policy: SpreadPolicy) -> Result<(Matrix, ScaleParams)> {
    let (n_rows, n_cols) = matrix.shape();
    let mut means = Vec::with_capacity(n_cols);
    let mut spreads = Vec::with_capacity(n_cols);

    for col in 0..n_cols {
        let values: Vec<f64> = (0..n_rows)
            .map(|row| matrix.get(row, col))
            .filter(|v| !v.is_nan())
            .collect();

        let (mean, sd) = mean_and_sd(&values);
        let spread = if sd > MIN_SPREAD {
            sd
        } else {
            match policy {
                SpreadPolicy::Fallback(fallback) => {
                    warn!(
                        "Column {} has zero spread over {} values, scaling by {}",
                        col,
                        values.len(),
                        fallback
                    );
                    fallback
                }
                SpreadPolicy::Fail => return Err(ImputeError::DegenerateColumn { column: col }),
            }
        };

        means.push(mean);
        spreads.push(spread);
    }

    let mut scaled = matrix.clone();
    for row in 0..n_rows {
        for col in 0..n_cols {
            let v = matrix.get(row, col);
            scaled.set(row, col, (v - means[col]) / spreads[col]);
        }
    }

    Ok((scaled, ScaleParams { means, spreads }))
}

/// Undo [`scale`]. Consumes the parameters: they belong to exactly one run.
pub fn recover(matrix: &Matrix, params: ScaleParams) -> Result<Matrix> {
    let (n_rows, n_cols) = matrix.shape();
    if n_cols != params.n_cols() {
        return Err(ImputeError::ShapeMismatch(format!(
            "scale parameters cover {} columns, matrix has {}",
            params.n_cols(),
            n_cols
        )));
    }

    let mut recovered = matrix.clone();
    for row in 0..n_rows {
        for col in 0..n_cols {
            let v = matrix.get(row, col);
            recovered.set(row, col, v * params.spreads[col] + params.means[col]);
        }
    }
    Ok(recovered)
}

/// Mean and sample standard deviation (n - 1). Empty input gives `(0, 0)`,
/// a single value gives `(value, 0)`.
pub(crate) fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[
            vec![1.0, 10.0, -3.0],
            vec![2.0, 20.0, 0.5],
            vec![3.0, 35.0, 7.25],
            vec![4.0, 41.0, 2.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_scaled_columns_have_zero_mean_unit_sd() {
        let (scaled, _) = scale(&sample(), SpreadPolicy::Fail).unwrap();
        for col in 0..scaled.n_cols() {
            let (mean, sd) = mean_and_sd(&scaled.column(col));
            assert!(mean.abs() < 1e-12, "column {} mean {}", col, mean);
            assert!((sd - 1.0).abs() < 1e-12, "column {} sd {}", col, sd);
        }
    }

    #[test]
    fn test_round_trip() {
        let original = sample();
        let (scaled, params) = scale(&original, SpreadPolicy::Fail).unwrap();
        let recovered = recover(&scaled, params).unwrap();

        for (a, b) in original.as_slice().iter().zip(recovered.as_slice()) {
            assert!((a - b).abs() < 1e-12, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_scale_does_not_touch_input() {
        let original = sample();
        let copy = original.clone();
        let _ = scale(&original, SpreadPolicy::Fail).unwrap();
        assert_eq!(original, copy);
    }

    #[test]
    fn test_nan_cells_are_skipped_and_preserved() {
        let m = Matrix::from_rows(&[vec![f64::NAN], vec![2.0], vec![4.0]]).unwrap();
        let (scaled, params) = scale(&m, SpreadPolicy::Fail).unwrap();

        assert!(scaled.get(0, 0).is_nan());
        assert_eq!(params.means(), &[3.0]);
        assert!((params.spreads()[0] - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_spread_uses_fallback() {
        let m = Matrix::from_rows(&[vec![5.0, 1.0], vec![5.0, 2.0], vec![5.0, 3.0]]).unwrap();
        let (scaled, params) = scale(&m, SpreadPolicy::Fallback(1.0)).unwrap();

        assert_eq!(params.spreads()[0], 1.0);
        assert_eq!(scaled.column(0), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_spread_fails_under_fail_policy() {
        let m = Matrix::from_rows(&[vec![1.0, 5.0], vec![2.0, 5.0]]).unwrap();
        let result = scale(&m, SpreadPolicy::Fail);
        assert!(matches!(
            result,
            Err(ImputeError::DegenerateColumn { column: 1 })
        ));
    }

    #[test]
    fn test_recover_rejects_wrong_width() {
        let (_, params) = scale(&sample(), SpreadPolicy::Fail).unwrap();
        let narrow = Matrix::filled(2, 2, 0.0);
        assert!(matches!(
            recover(&narrow, params),
            Err(ImputeError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_mean_and_sd_small_inputs() {
        assert_eq!(mean_and_sd(&[]), (0.0, 0.0));
        assert_eq!(mean_and_sd(&[4.0]), (4.0, 0.0));
    }
}
