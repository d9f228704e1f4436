//! Bounded Iterative Imputation of Left-Censored Data
//!
//! Concentrations below an instrument's detection limit are only known to
//! lie in `(0, limit]`. This library replaces every such cell with a draw
//! that respects the limit and the correlation structure of the other
//! variables.
//!
//! # Overview
//!
//! A run goes through these stages:
//!
//! - **Transform**: log of every concentration and limit, then per-column
//!   standardization ([`scale`] / [`recover`])
//! - **Initialize**: quantile-regression fit of each column's lower tail,
//!   with censored cells drawn below the limit ([`QrilcInitializer`])
//! - **Refine**: block-Gibbs sweeps where each censored column is regressed
//!   on the others by a cross-validated elastic net and its censored cells
//!   are redrawn from a truncated normal ([`ConditionalImputer`],
//!   [`ImputationScheduler`])
//! - **Recover**: undo the scaling and the log; observed cells come back
//!   verbatim, imputed cells never exceed the limit
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use censored_impute::{ImputationConfig, Imputer, Matrix};
//!
//! // NaN marks a value below the detection limit
//! let raw = Matrix::from_rows(&[
//!     vec![f64::NAN, 2.1, 1.6],
//!     vec![1.4, 3.3, 1.8],
//!     vec![2.2, 4.0, 2.9],
//!     // ...
//! ])?;
//! let limits = [1.0, 0.5, 0.5];
//!
//! let config = ImputationConfig::builder()
//!     .inner_iters(20)
//!     .outer_cycles(5)
//!     .seed(7)
//!     .build()?;
//!
//! let result = Imputer::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .impute(&raw, &limits)?;
//!
//! println!("{}", serde_json::to_string_pretty(&result.summary())?);
//! ```
//!
//! # DataFrames
//!
//! Polars frames are accepted through [`Imputer::impute_frame`]; null and
//! `NaN` cells are treated as censored. See the [`frame`] module.
//!
//! # Custom predictors
//!
//! The refinement step depends only on the [`Predictor`] trait. Pass your
//! own implementation with [`ImputerBuilder::predictor`]:
//!
//! ```rust,ignore
//! use censored_impute::{ElasticNetCv, Imputer};
//! use std::sync::Arc;
//!
//! let lasso = ElasticNetCv::new(vec![1.0]).with_folds(3);
//! let imputer = Imputer::builder().predictor(Arc::new(lasso)).build()?;
//! ```
//!
//! # Reproducibility
//!
//! Every random draw (initial values, fold shuffles, redraws) comes from a
//! single generator seeded with [`ImputationConfig::seed`], so identical
//! inputs and seed give bit-identical output.

pub mod config;
pub mod error;
pub mod frame;
pub mod imputers;
pub mod pipeline;
pub mod regression;
pub mod scaling;
pub mod types;

// Re-exports for convenient access
pub use config::{ConfigValidationError, ImputationConfig, ImputationConfigBuilder, SpreadPolicy};
pub use error::{BOUND_ROW, ImputeError, Result, ResultExt};
pub use frame::FrameImputation;
pub use imputers::{ConditionalImputer, QrilcInitializer};
pub use pipeline::{
    ClosureProgressReporter, ImputationScheduler, ImputationStage, Imputer, ImputerBuilder,
    ProgressReporter, ProgressUpdate, SchedulerOutcome,
};
pub use regression::{ElasticNetCv, FitError, FittedModel, KFold, LinearModel, Predictor};
pub use scaling::{ScaleParams, recover, scale};
pub use types::{CensorMask, CycleSummary, ImputationResult, ImputationSummary, Matrix};
