//! Cross-validated elastic net.
//!
//! Fits the glmnet objective
//!
//! ```text
//! (1/2n) ||y - Xb||² + λ (a ||b||₁ + (1 - a)/2 ||b||²)
//! ```
//!
//! on standardized predictors by cyclic coordinate descent. For every
//! penalty mix `a` a log-spaced path of `λ` values is walked from the
//! smallest penalty that zeroes every coefficient downwards, each fit warm
//! started from the previous one. K-fold cross-validation picks the
//! `(a, λ)` pair with the lowest held-out squared error and the model is
//! refit on all rows.

use super::{FitError, FittedModel, KFold, Predictor};
use crate::config::ImputationConfig;
use crate::types::Matrix;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Predictor spreads at or below this are treated as constant columns.
const MIN_SD: f64 = 1e-12;

/// Floor on the mix when sizing the path, so pure ridge still gets a finite `λ_max`.
const MIN_MIX_FOR_PATH: f64 = 1e-3;

/// Elastic-net regression with the penalty chosen by cross-validation.
///
/// # Examples
///
/// ```rust,ignore
/// use censored_impute::regression::ElasticNetCv;
///
/// let model = ElasticNetCv::new(vec![0.1, 0.5, 0.9])
///     .with_folds(5)
///     .fit_linear(&design, &target, &mut rng)?;
/// let prediction = model.predict_row(design.row(0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNetCv {
    penalty_mix: Vec<f64>,
    n_lambdas: usize,
    lambda_min_ratio: f64,
    folds: usize,
    max_iter: usize,
    tolerance: f64,
}

impl Default for ElasticNetCv {
    fn default() -> Self {
        Self::from_config(&ImputationConfig::default())
    }
}

impl ElasticNetCv {
    /// Creates a predictor searching the given mixes (0.0 = ridge, 1.0 = lasso).
    #[must_use]
    pub fn new(penalty_mix: Vec<f64>) -> Self {
        Self {
            penalty_mix,
            ..Self::default()
        }
    }

    /// Creates a predictor from the regression fields of a run configuration.
    #[must_use]
    pub fn from_config(config: &ImputationConfig) -> Self {
        Self {
            penalty_mix: config.penalty_mix.clone(),
            n_lambdas: config.n_lambdas,
            lambda_min_ratio: config.lambda_min_ratio,
            folds: config.cv_folds,
            max_iter: config.max_iter,
            tolerance: config.tolerance,
        }
    }

    #[must_use]
    pub fn with_n_lambdas(mut self, n_lambdas: usize) -> Self {
        self.n_lambdas = n_lambdas.max(1);
        self
    }

    #[must_use]
    pub fn with_lambda_min_ratio(mut self, ratio: f64) -> Self {
        self.lambda_min_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds.max(2);
        self
    }

    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn penalty_mix(&self) -> &[f64] {
        &self.penalty_mix
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Fit and return the concrete model.
    ///
    /// # Errors
    ///
    /// - [`FitError::EmptyPenaltyGrid`] or [`FitError::InvalidPenaltyMix`] if the
    ///   mixes are empty or not all in `[0, 1]`
    /// - [`FitError::LengthMismatch`] if `target` does not have one value per row
    /// - [`FitError::TooFewFolds`] if there are fewer rows than folds
    /// - [`FitError::TooFewRows`] if there are fewer rows than non-constant predictors
    /// - [`FitError::NotConverged`] if coordinate descent exceeds `max_iter` sweeps
    /// - [`FitError::NonFinite`] if the fit produces `NaN` or infinite values
    pub fn fit_linear(
        &self,
        design: &Matrix,
        target: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<LinearModel, FitError> {
        if self.penalty_mix.is_empty() {
            return Err(FitError::EmptyPenaltyGrid);
        }
        if let Some(&mix) = self.penalty_mix.iter().find(|m| !(0.0..=1.0).contains(*m)) {
            return Err(FitError::InvalidPenaltyMix(mix));
        }

        let rows = design.n_rows();
        if rows != target.len() {
            return Err(FitError::LengthMismatch {
                rows,
                targets: target.len(),
            });
        }
        if rows < self.folds {
            return Err(FitError::TooFewFolds {
                rows,
                folds: self.folds,
            });
        }

        let all_rows: Vec<usize> = (0..rows).collect();
        let full = Standardized::new(design, target, &all_rows);
        let active = full.active_predictors();
        if rows < active {
            return Err(FitError::TooFewRows {
                rows,
                predictors: active,
            });
        }

        let paths: Vec<Vec<f64>> = self
            .penalty_mix
            .iter()
            .map(|&mix| self.lambda_path(full.lambda_max(mix)))
            .collect();

        // Held-out squared error for every (mix, lambda) pair.
        let mut errors: Vec<Vec<f64>> = paths.iter().map(|path| vec![0.0; path.len()]).collect();
        for (train, test) in KFold::new(self.folds).split(rows, rng) {
            let data = Standardized::new(design, target, &train);
            for (m, (&mix, path)) in self.penalty_mix.iter().zip(&paths).enumerate() {
                let betas = self.fit_path(&data, mix, path)?;
                for (l, beta) in betas.iter().enumerate() {
                    errors[m][l] += test
                        .iter()
                        .map(|&row| (target[row] - data.predict(beta, design.row(row))).powi(2))
                        .sum::<f64>();
                }
            }
        }

        let mut best = (f64::INFINITY, 0, 0);
        for (m, per_lambda) in errors.iter().enumerate() {
            for (l, &sse) in per_lambda.iter().enumerate() {
                if sse < best.0 {
                    best = (sse, m, l);
                }
            }
        }
        let (sse, m, l) = best;
        if !sse.is_finite() {
            return Err(FitError::NonFinite("cross-validation error"));
        }

        let mix = self.penalty_mix[m];
        let lambda = paths[m][l];
        let beta = self
            .fit_path(&full, mix, &paths[m][..=l])?
            .pop()
            .unwrap_or_else(|| vec![0.0; design.n_cols()]);

        let model = full.into_model(&beta, design, target, mix, lambda)?;
        trace!(
            "Elastic net: mix={} lambda={:.3e} cv_mse={:.4} nonzero={} residual_var={:.4}",
            mix,
            lambda,
            sse / rows as f64,
            model.nonzero_coefficients(),
            model.residual_variance
        );
        Ok(model)
    }

    /// `n_lambdas` values from `lambda_max` down to `lambda_max * lambda_min_ratio`,
    /// evenly spaced on the log scale.
    fn lambda_path(&self, lambda_max: f64) -> Vec<f64> {
        // A target orthogonal to every predictor has the zero solution for any penalty.
        let lambda_max = if lambda_max.is_finite() && lambda_max > 0.0 {
            lambda_max
        } else {
            1.0
        };
        let n = self.n_lambdas.max(1);
        (0..n)
            .map(|k| {
                let t = if n == 1 {
                    1.0
                } else {
                    k as f64 / (n - 1) as f64
                };
                lambda_max * self.lambda_min_ratio.powf(t)
            })
            .collect()
    }

    /// Standardized coefficients for every penalty on `path`, warm started.
    fn fit_path(
        &self,
        data: &Standardized,
        mix: f64,
        path: &[f64],
    ) -> Result<Vec<Vec<f64>>, FitError> {
        let mut beta = vec![0.0; data.columns.len()];
        let mut residual = data.target.clone();
        let mut betas = Vec::with_capacity(path.len());
        for &lambda in path {
            self.coordinate_descent(data, lambda, mix, &mut beta, &mut residual)?;
            betas.push(beta.clone());
        }
        Ok(betas)
    }

    fn coordinate_descent(
        &self,
        data: &Standardized,
        lambda: f64,
        mix: f64,
        beta: &mut [f64],
        residual: &mut [f64],
    ) -> Result<(), FitError> {
        let n = residual.len() as f64;
        let l1 = lambda * mix;
        let l2 = lambda * (1.0 - mix);
        let null_deviance = data.target.iter().map(|y| y * y).sum::<f64>() / n;
        let threshold = self.tolerance * null_deviance;

        for _ in 0..self.max_iter {
            let mut max_update = 0.0f64;
            for (j, column) in data.columns.iter().enumerate() {
                if data.sds[j] <= MIN_SD {
                    continue;
                }
                // Columns have unit mean square, so the partial residual fit is rho.
                let rho = dot(column, residual) / n + beta[j];
                let updated = soft_threshold(rho, l1) / (1.0 + l2);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    for (r, x) in residual.iter_mut().zip(column) {
                        *r -= delta * x;
                    }
                    beta[j] = updated;
                    max_update = max_update.max(delta * delta);
                }
            }

            if !max_update.is_finite() {
                return Err(FitError::NonFinite("coefficient"));
            }
            if max_update <= threshold {
                return Ok(());
            }
        }

        Err(FitError::NotConverged(self.max_iter))
    }
}

impl Predictor for ElasticNetCv {
    fn fit(
        &self,
        design: &Matrix,
        target: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<Box<dyn FittedModel>, FitError> {
        Ok(Box::new(self.fit_linear(design, target, rng)?))
    }

    fn name(&self) -> &str {
        "elastic-net-cv"
    }
}

/// Soft-thresholding operator for L1 regularization.
pub(crate) fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A subset of rows, centered and scaled to unit mean square, column-major.
struct Standardized {
    columns: Vec<Vec<f64>>,
    means: Vec<f64>,
    /// Population spreads; constant columns keep 0 and stay all-zero.
    sds: Vec<f64>,
    target: Vec<f64>,
    target_mean: f64,
}

impl Standardized {
    fn new(design: &Matrix, target: &[f64], rows: &[usize]) -> Self {
        let n = rows.len().max(1) as f64;
        let target_mean = rows.iter().map(|&r| target[r]).sum::<f64>() / n;
        let centered_target = rows.iter().map(|&r| target[r] - target_mean).collect();

        let p = design.n_cols();
        let mut columns = Vec::with_capacity(p);
        let mut means = Vec::with_capacity(p);
        let mut sds = Vec::with_capacity(p);
        for col in 0..p {
            let values: Vec<f64> = rows.iter().map(|&r| design.get(r, col)).collect();
            let mean = values.iter().sum::<f64>() / n;
            let sd = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            let column = if sd > MIN_SD {
                values.iter().map(|v| (v - mean) / sd).collect()
            } else {
                vec![0.0; values.len()]
            };
            columns.push(column);
            means.push(mean);
            sds.push(if sd > MIN_SD { sd } else { 0.0 });
        }

        Self {
            columns,
            means,
            sds,
            target: centered_target,
            target_mean,
        }
    }

    fn active_predictors(&self) -> usize {
        self.sds.iter().filter(|&&sd| sd > MIN_SD).count()
    }

    /// Smallest penalty at which every coefficient is zero.
    fn lambda_max(&self, mix: f64) -> f64 {
        let n = self.target.len().max(1) as f64;
        let max_dot = self
            .columns
            .iter()
            .map(|c| dot(c, &self.target).abs())
            .fold(0.0, f64::max);
        max_dot / (n * mix.max(MIN_MIX_FOR_PATH))
    }

    fn predict(&self, beta: &[f64], row: &[f64]) -> f64 {
        let mut prediction = self.target_mean;
        for (j, &b) in beta.iter().enumerate() {
            if self.sds[j] > MIN_SD {
                prediction += b * (row[j] - self.means[j]) / self.sds[j];
            }
        }
        prediction
    }

    /// Map standardized coefficients back to the design's units.
    fn into_model(
        self,
        beta: &[f64],
        design: &Matrix,
        target: &[f64],
        penalty_mix: f64,
        lambda: f64,
    ) -> Result<LinearModel, FitError> {
        let coefficients: Vec<f64> = beta
            .iter()
            .zip(&self.sds)
            .map(|(&b, &sd)| if sd > MIN_SD { b / sd } else { 0.0 })
            .collect();
        let intercept = self.target_mean - dot(&coefficients, &self.means);

        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFinite("coefficient"));
        }

        let mut model = LinearModel {
            intercept,
            coefficients,
            residual_variance: 0.0,
            penalty_mix,
            lambda,
        };

        let rows = design.n_rows();
        let rss: f64 = (0..rows)
            .map(|r| (target[r] - model.predict_row(design.row(r))).powi(2))
            .sum();
        let dof = rows.saturating_sub(model.nonzero_coefficients() + 1).max(1);
        model.residual_variance = rss / dof as f64;

        if !model.residual_variance.is_finite() {
            return Err(FitError::NonFinite("residual variance"));
        }
        Ok(model)
    }
}

/// Linear model in the design's original units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    intercept: f64,
    coefficients: Vec<f64>,
    residual_variance: f64,
    penalty_mix: f64,
    lambda: f64,
}

impl LinearModel {
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Penalty mix chosen by cross-validation.
    pub fn penalty_mix(&self) -> f64 {
        self.penalty_mix
    }

    /// Penalty strength chosen by cross-validation.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn nonzero_coefficients(&self) -> usize {
        self.coefficients.iter().filter(|&&c| c != 0.0).count()
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept + dot(&self.coefficients, row)
    }
}

impl FittedModel for LinearModel {
    fn predict(&self, row: &[f64]) -> f64 {
        self.predict_row(row)
    }

    fn residual_variance(&self) -> f64 {
        self.residual_variance
    }
}
