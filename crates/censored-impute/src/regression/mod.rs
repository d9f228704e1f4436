//! Regression backends for the conditional imputer.
//!
//! This module defines the [`Predictor`] trait that the conditional imputer
//! uses to model one column from all the others. The block-Gibbs scheduling
//! never sees which regression is behind it, so a different model can be
//! swapped in without touching the sweep logic.
//!
//! # Implementing a New Predictor
//!
//! 1. Create a new file in `src/regression/` (e.g., `tree.rs`)
//! 2. Implement [`Predictor`] for the configuration struct and
//!    [`FittedModel`] for what `fit` returns
//! 3. Hand it to the pipeline with `Imputer::builder().predictor(..)`
//!
//! # Example
//!
//! ```rust,ignore
//! use censored_impute::regression::ElasticNetCv;
//! use censored_impute::Imputer;
//! use std::sync::Arc;
//!
//! let predictor = ElasticNetCv::new(vec![0.5]).with_folds(3);
//! let imputer = Imputer::builder()
//!     .predictor(Arc::new(predictor))
//!     .build()?;
//! ```

mod elastic_net;
mod kfold;

pub use elastic_net::{ElasticNetCv, LinearModel};
pub use kfold::KFold;

use crate::types::Matrix;
use rand::RngCore;
use thiserror::Error;

/// Why a predictor could not produce a usable model.
///
/// The conditional imputer turns these into
/// [`ImputeError::Fit`](crate::error::ImputeError::Fit) tagged with the column.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("{rows} rows for {predictors} predictors")]
    TooFewRows { rows: usize, predictors: usize },

    #[error("{rows} rows cannot be split into {folds} cross-validation folds")]
    TooFewFolds { rows: usize, folds: usize },

    #[error("design has {rows} rows but the target has {targets} values")]
    LengthMismatch { rows: usize, targets: usize },

    #[error("coordinate descent did not converge in {0} sweeps")]
    NotConverged(usize),

    #[error("fit produced a non-finite {0}")]
    NonFinite(&'static str),

    #[error("penalty mix {0} is outside [0, 1]")]
    InvalidPenaltyMix(f64),

    #[error("no penalty mix to search")]
    EmptyPenaltyGrid,
}

/// A regression that can be fit to a design matrix and target vector.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one predictor is shared by every
/// column of a run and by every run built from the same `Imputer`.
///
/// # Randomness
///
/// Any stochastic step (fold assignment, subsampling) must draw from `rng`.
/// The run owns the stream, which is what makes two runs with the same seed
/// bit-identical.
pub trait Predictor: Send + Sync + std::fmt::Debug {
    /// Fit the model. `design` has one row per entry of `target`.
    fn fit(
        &self,
        design: &Matrix,
        target: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<Box<dyn FittedModel>, FitError>;

    /// Get the predictor name for logging and debugging.
    fn name(&self) -> &str;
}

/// A fitted regression.
pub trait FittedModel: std::fmt::Debug {
    /// Predict the target for one design row.
    fn predict(&self, row: &[f64]) -> f64;

    /// Variance of the residuals around the fit, used as the spread of the
    /// redraw distribution.
    fn residual_variance(&self) -> f64;
}
