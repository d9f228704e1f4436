//! Configuration types for the censored imputation engine.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic setup.

use serde::{Deserialize, Serialize};

/// What to do when a column has zero spread during scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpreadPolicy {
    /// Divide by this value instead of the zero spread.
    Fallback(f64),
    /// Fail with [`ImputeError::DegenerateColumn`](crate::error::ImputeError::DegenerateColumn).
    Fail,
}

/// Configuration for an imputation run.
///
/// Use [`ImputationConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use censored_impute::config::ImputationConfig;
///
/// let config = ImputationConfig::builder()
///     .inner_iters(50)
///     .outer_cycles(10)
///     .seed(7)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationConfig {
    /// Refit-and-redraw rounds per column within one sweep.
    /// Default: 50
    pub inner_iters: usize,

    /// Full sweeps over every censored column.
    /// Default: 10
    pub outer_cycles: usize,

    /// Seed for the run RNG. Every stochastic step draws from it.
    /// Default: 42
    pub seed: u64,

    /// Elastic-net L1/L2 mixes searched by cross-validation
    /// (0.0 = ridge, 1.0 = lasso).
    /// Default: [0.1, 0.5, 0.9]
    pub penalty_mix: Vec<f64>,

    /// Number of penalty strengths on the regularization path.
    /// Default: 20
    pub n_lambdas: usize,

    /// Smallest penalty strength as a fraction of the largest one.
    /// Default: 1e-3
    pub lambda_min_ratio: f64,

    /// Cross-validation folds used to pick the penalty. A run needs at least
    /// this many rows; with fewer, the first refit fails with a fit error.
    /// Default: 5
    pub cv_folds: usize,

    /// Coordinate descent sweeps before a fit is declared non-convergent.
    /// Default: 10_000
    pub max_iter: usize,

    /// Coordinate descent stops once the largest squared coefficient update in a
    /// sweep falls below this fraction of the target variance.
    /// Default: 1e-7
    pub tolerance: f64,

    /// Spread substituted for a zero-variance column while scaling.
    /// `None` makes such a column a hard error.
    /// Default: Some(1.0)
    pub fallback_spread: Option<f64>,

    /// Multiplier on the initializer's fitted spread.
    /// Default: 1.0
    pub tune_sigma: f64,

    /// Stop early once the largest change in censored-cell column means
    /// between two cycles drops below this value. `None` runs every cycle.
    /// Default: None
    pub convergence_tol: Option<f64>,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            inner_iters: 50,
            outer_cycles: 10,
            seed: 42,
            penalty_mix: vec![0.1, 0.5, 0.9],
            n_lambdas: 20,
            lambda_min_ratio: 1e-3,
            cv_folds: 5,
            max_iter: 10_000,
            tolerance: 1e-7,
            fallback_spread: Some(1.0),
            tune_sigma: 1.0,
            convergence_tol: None,
        }
    }
}

impl ImputationConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ImputationConfigBuilder {
        ImputationConfigBuilder::default()
    }

    /// Scaling policy implied by `fallback_spread`.
    pub fn spread_policy(&self) -> SpreadPolicy {
        match self.fallback_spread {
            Some(spread) => SpreadPolicy::Fallback(spread),
            None => SpreadPolicy::Fail,
        }
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.inner_iters == 0 {
            return Err(ConfigValidationError::ZeroIterations("inner_iters".to_string()));
        }

        if self.outer_cycles == 0 {
            return Err(ConfigValidationError::ZeroIterations("outer_cycles".to_string()));
        }

        if self.penalty_mix.is_empty() {
            return Err(ConfigValidationError::EmptyPenaltyMix);
        }

        if let Some(&mix) = self
            .penalty_mix
            .iter()
            .find(|m| !(0.0..=1.0).contains(*m))
        {
            return Err(ConfigValidationError::InvalidPenaltyMix(mix));
        }

        if self.n_lambdas == 0 {
            return Err(ConfigValidationError::ZeroIterations("n_lambdas".to_string()));
        }

        if !(self.lambda_min_ratio > 0.0 && self.lambda_min_ratio < 1.0) {
            return Err(ConfigValidationError::InvalidPositive {
                field: "lambda_min_ratio".to_string(),
                value: self.lambda_min_ratio,
            });
        }

        if self.cv_folds < 2 {
            return Err(ConfigValidationError::InvalidFolds(self.cv_folds));
        }

        if self.max_iter == 0 {
            return Err(ConfigValidationError::ZeroIterations("max_iter".to_string()));
        }

        let positive_fields = [
            ("tolerance", Some(self.tolerance)),
            ("tune_sigma", Some(self.tune_sigma)),
            ("fallback_spread", self.fallback_spread),
            ("convergence_tol", self.convergence_tol),
        ];
        for (field, value) in positive_fields {
            if let Some(value) = value
                && !(value.is_finite() && value > 0.0)
            {
                return Err(ConfigValidationError::InvalidPositive {
                    field: field.to_string(),
                    value,
                });
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("'{0}' must be at least 1")]
    ZeroIterations(String),

    #[error("penalty_mix must contain at least one value")]
    EmptyPenaltyMix,

    #[error("Invalid penalty mix {0} (must be between 0.0 and 1.0)")]
    InvalidPenaltyMix(f64),

    #[error("Invalid value for '{field}': {value} (must be finite and positive)")]
    InvalidPositive { field: String, value: f64 },

    #[error("Invalid cross-validation folds: {0} (must be at least 2)")]
    InvalidFolds(usize),
}

/// Builder for [`ImputationConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct ImputationConfigBuilder {
    inner_iters: Option<usize>,
    outer_cycles: Option<usize>,
    seed: Option<u64>,
    penalty_mix: Option<Vec<f64>>,
    n_lambdas: Option<usize>,
    lambda_min_ratio: Option<f64>,
    cv_folds: Option<usize>,
    max_iter: Option<usize>,
    tolerance: Option<f64>,
    fallback_spread: Option<Option<f64>>,
    tune_sigma: Option<f64>,
    convergence_tol: Option<f64>,
}

impl ImputationConfigBuilder {
    /// Set the number of refit rounds per column per sweep.
    pub fn inner_iters(mut self, iters: usize) -> Self {
        self.inner_iters = Some(iters);
        self
    }

    /// Set the number of full sweeps.
    pub fn outer_cycles(mut self, cycles: usize) -> Self {
        self.outer_cycles = Some(cycles);
        self
    }

    /// Set the RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the elastic-net mixes searched by cross-validation.
    ///
    /// # Arguments
    /// * `mix` - Values between 0.0 (ridge) and 1.0 (lasso)
    pub fn penalty_mix(mut self, mix: impl Into<Vec<f64>>) -> Self {
        self.penalty_mix = Some(mix.into());
        self
    }

    /// Set the length of the regularization path.
    pub fn n_lambdas(mut self, n: usize) -> Self {
        self.n_lambdas = Some(n);
        self
    }

    /// Set the ratio between the smallest and largest penalty strength.
    pub fn lambda_min_ratio(mut self, ratio: f64) -> Self {
        self.lambda_min_ratio = Some(ratio);
        self
    }

    /// Set the number of cross-validation folds.
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = Some(folds);
        self
    }

    /// Set the coordinate descent sweep limit.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    /// Set the coordinate descent tolerance.
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tolerance = Some(tol);
        self
    }

    /// Set the spread used for zero-variance columns.
    ///
    /// Pass `None` to turn zero-variance columns into an error instead.
    pub fn fallback_spread(mut self, spread: Option<f64>) -> Self {
        self.fallback_spread = Some(spread);
        self
    }

    /// Set the multiplier on the initializer's fitted spread.
    pub fn tune_sigma(mut self, tune: f64) -> Self {
        self.tune_sigma = Some(tune);
        self
    }

    /// Enable early stopping on the cycle-to-cycle change of censored means.
    pub fn convergence_tol(mut self, tol: f64) -> Self {
        self.convergence_tol = Some(tol);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `ImputationConfig` or an error if validation fails.
    pub fn build(self) -> Result<ImputationConfig, ConfigValidationError> {
        let defaults = ImputationConfig::default();
        let config = ImputationConfig {
            inner_iters: self.inner_iters.unwrap_or(defaults.inner_iters),
            outer_cycles: self.outer_cycles.unwrap_or(defaults.outer_cycles),
            seed: self.seed.unwrap_or(defaults.seed),
            penalty_mix: self.penalty_mix.unwrap_or(defaults.penalty_mix),
            n_lambdas: self.n_lambdas.unwrap_or(defaults.n_lambdas),
            lambda_min_ratio: self.lambda_min_ratio.unwrap_or(defaults.lambda_min_ratio),
            cv_folds: self.cv_folds.unwrap_or(defaults.cv_folds),
            max_iter: self.max_iter.unwrap_or(defaults.max_iter),
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
            fallback_spread: self.fallback_spread.unwrap_or(defaults.fallback_spread),
            tune_sigma: self.tune_sigma.unwrap_or(defaults.tune_sigma),
            convergence_tol: self.convergence_tol.or(defaults.convergence_tol),
        };

        config.validate()?;
        Ok(config)
    }
}
