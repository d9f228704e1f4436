//! Quantile-regression left-censored (QRILC) initializer.
//!
//! Each column's observed values are treated as the upper part of a normal
//! sample whose lower `p_cens` fraction was censored. Regressing the observed
//! order statistics on the normal quantiles of their plotting positions gives
//! the location and spread of the complete-data distribution; censored cells
//! are drawn from its left tail, truncated at the detection limit.

use crate::error::{ImputeError, Result};
use crate::imputers::truncated::{normal_quantile, sample_upper_truncated};
use crate::scaling::mean_and_sd;
use crate::types::{CensorMask, Matrix};
use rand::RngCore;
use tracing::{debug, warn};

/// Observed values needed to fit a column's tail.
pub const MIN_OBSERVED: usize = 2;

/// Location and spread fitted for one column, plus the draw ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailFit {
    pub mean: f64,
    pub sd: f64,
    /// `min(quantile at the censored fraction, detection limit)`.
    pub ceiling: f64,
}

/// First-pass imputer producing a complete working matrix.
#[derive(Debug, Clone, Copy)]
pub struct QrilcInitializer {
    tune_sigma: f64,
}

impl Default for QrilcInitializer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl QrilcInitializer {
    /// Create an initializer whose draws use `tune_sigma` times the fitted spread.
    pub fn new(tune_sigma: f64) -> Self {
        Self { tune_sigma }
    }

    /// Fill every censored cell of `matrix` with a draw from its column's
    /// fitted left tail. Observed cells are copied unchanged.
    pub fn initialize(
        &self,
        matrix: &Matrix,
        mask: &CensorMask,
        bounds: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<Matrix> {
        mask.ensure_matches(matrix)?;
        if bounds.len() != matrix.n_cols() {
            return Err(ImputeError::ShapeMismatch(format!(
                "{} bounds for {} columns",
                bounds.len(),
                matrix.n_cols()
            )));
        }

        check_observed(mask)?;

        let mut working = matrix.clone();
        for (col, &bound) in bounds.iter().enumerate() {
            let censored = mask.censored_rows(col);
            if censored.is_empty() {
                continue;
            }

            let observed: Vec<f64> = (0..matrix.n_rows())
                .filter(|&row| !mask.is_censored(row, col))
                .map(|row| matrix.get(row, col))
                .collect();

            let fit = fit_tail(col, &observed, censored.len(), bound)?;
            debug!(
                "Column {}: tail fit mean={:.4} sd={:.4} ceiling={:.4} ({} censored)",
                col,
                fit.mean,
                fit.sd,
                fit.ceiling,
                censored.len()
            );

            for row in censored {
                let sd = fit.sd * self.tune_sigma;
                let draw = sample_upper_truncated(rng, fit.mean, sd, fit.ceiling);
                working.set(row, col, draw);
            }
        }

        Ok(working)
    }
}

/// Every censored column must keep at least [`MIN_OBSERVED`] observed cells.
///
/// Depends only on the mask, so it can run before any value is transformed.
pub fn check_observed(mask: &CensorMask) -> Result<()> {
    let (n_rows, _) = mask.shape();
    for column in mask.censored_columns() {
        let observed = n_rows - mask.censored_in_column(column);
        if observed < MIN_OBSERVED {
            return Err(ImputeError::InsufficientData {
                column,
                observed,
                required: MIN_OBSERVED,
            });
        }
    }
    Ok(())
}

/// Fit the complete-data normal for one column from its observed values.
pub fn fit_tail(column: usize, observed: &[f64], n_censored: usize, bound: f64) -> Result<TailFit> {
    let k = observed.len();
    if k < MIN_OBSERVED {
        return Err(ImputeError::InsufficientData {
            column,
            observed: k,
            required: MIN_OBSERVED,
        });
    }

    let mut sorted = observed.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = (k + n_censored) as f64;
    let p_cens = n_censored as f64 / n;
    let quantiles: Vec<f64> = (1..=k)
        .map(|i| normal_quantile(p_cens + (1.0 - p_cens) * (i as f64 - 0.5) / k as f64))
        .collect();

    let (z_mean, _) = mean_and_sd(&quantiles);
    let (x_mean, x_sd) = mean_and_sd(&sorted);
    let mut sxz = 0.0;
    let mut szz = 0.0;
    for (z, x) in quantiles.iter().zip(&sorted) {
        sxz += (z - z_mean) * (x - x_mean);
        szz += (z - z_mean).powi(2);
    }
    let slope = sxz / szz;

    let sd = if slope.is_finite() && slope > 0.0 {
        slope
    } else if x_sd > 0.0 {
        warn!(
            "Column {}: quantile regression slope {} unusable, using sample spread {:.4}",
            column, slope, x_sd
        );
        x_sd
    } else {
        warn!("Column {}: observed values are constant, using unit spread", column);
        1.0
    };
    let mean = if slope.is_finite() && slope > 0.0 {
        x_mean - slope * z_mean
    } else {
        x_mean
    };

    let ceiling = if n_censored > 0 {
        (mean + sd * normal_quantile(p_cens)).min(bound)
    } else {
        bound
    };

    Ok(TailFit { mean, sd, ceiling })
}
