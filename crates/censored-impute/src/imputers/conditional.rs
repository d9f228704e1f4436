use crate::error::{ImputeError, Result};
use crate::imputers::truncated::sample_upper_truncated;
use crate::regression::{FitError, Predictor};
use crate::scaling::mean_and_sd;
use crate::types::{CensorMask, Matrix};
use rand::RngCore;
use std::sync::Arc;
use tracing::trace;

/// Predictor columns with a spread at or below this carry no information.
const MIN_PREDICTOR_SD: f64 = 1e-12;

/// One Gibbs step: regress a column on all the others and redraw its
/// censored cells from the bounded conditional distribution.
#[derive(Debug, Clone)]
pub struct ConditionalImputer {
    predictor: Arc<dyn Predictor>,
}

impl ConditionalImputer {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    /// Refit `target` against every other column of `working` and redraw its
    /// censored cells from `N(prediction, residual variance)` truncated to
    /// `(-inf, bound]`.
    ///
    /// Only the censored cells of `target` are written. Returns how many
    /// cells were redrawn.
    ///
    /// # Errors
    ///
    /// [`ImputeError::Fit`] if the regression cannot be fit or yields a
    /// non-finite prediction or variance.
    pub fn refine(
        &self,
        working: &mut Matrix,
        target: usize,
        mask: &CensorMask,
        bound: f64,
        rng: &mut dyn RngCore,
    ) -> Result<usize> {
        mask.ensure_matches(working)?;
        let censored = mask.censored_rows(target);
        if censored.is_empty() {
            return Ok(0);
        }

        let predictors = informative_columns(working, target);
        let rows = working.n_rows();
        if rows < predictors.len() {
            return Err(fit_error(
                target,
                FitError::TooFewRows {
                    rows,
                    predictors: predictors.len(),
                },
            ));
        }

        let design = working.select_columns(&predictors);
        let response = working.column(target);
        let model = self
            .predictor
            .fit(&design, &response, rng)
            .map_err(|e| fit_error(target, e))?;

        let variance = model.residual_variance();
        if !variance.is_finite() || variance < 0.0 {
            return Err(fit_error(target, FitError::NonFinite("residual variance")));
        }
        let sd = variance.sqrt();

        for &row in &censored {
            let prediction = model.predict(design.row(row));
            if !prediction.is_finite() {
                return Err(fit_error(target, FitError::NonFinite("prediction")));
            }
            working.set(row, target, sample_upper_truncated(rng, prediction, sd, bound));
        }

        trace!(
            "Column {}: {} predictors, residual sd {:.4}, {} cells redrawn",
            target,
            predictors.len(),
            sd,
            censored.len()
        );
        Ok(censored.len())
    }
}

/// Every column other than `target` whose values are not constant.
fn informative_columns(working: &Matrix, target: usize) -> Vec<usize> {
    (0..working.n_cols())
        .filter(|&col| col != target)
        .filter(|&col| mean_and_sd(&working.column(col)).1 > MIN_PREDICTOR_SD)
        .collect()
}

fn fit_error(column: usize, error: FitError) -> ImputeError {
    ImputeError::Fit {
        column,
        reason: error.to_string(),
    }
}
