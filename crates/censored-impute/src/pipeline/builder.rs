//! Main imputation pipeline module.
//!
//! This module provides the [`Imputer`] struct and its builder. The imputer
//! owns no statistics of its own: it guarantees that every stage runs in
//! the same numeric space by log-transforming the raw concentrations,
//! scaling them together with the detection limits, and undoing both at the
//! end.

use crate::config::{ConfigValidationError, ImputationConfig};
use crate::error::{BOUND_ROW, ImputeError, Result, ResultExt};
use crate::imputers::{ConditionalImputer, QrilcInitializer, check_observed};
use crate::pipeline::progress::{
    ClosureProgressReporter, ImputationStage, ProgressReporter, ProgressUpdate,
};
use crate::pipeline::scheduler::ImputationScheduler;
use crate::regression::{ElasticNetCv, Predictor};
use crate::scaling;
use crate::types::{CensorMask, ImputationResult, Matrix};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Bounded iterative imputation of left-censored data.
///
/// Use [`Imputer::builder()`] to create a new imputer with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use censored_impute::{ImputationConfig, Imputer, Matrix};
///
/// let raw = Matrix::from_rows(&[
///     vec![f64::NAN, 2.1, 1.6],
///     vec![1.4, 3.3, 1.8],
///     // ...
/// ])?;
///
/// let result = Imputer::builder()
///     .config(ImputationConfig::builder().seed(7).build()?)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .impute(&raw, &[1.0, 0.5, 0.5])?;
/// ```
pub struct Imputer {
    config: ImputationConfig,
    predictor: Arc<dyn Predictor>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// One imputer may serve independent runs on several threads, each with its own input.
static_assertions::assert_impl_all!(Imputer: Send, Sync);

impl Imputer {
    /// Create a new imputer builder.
    pub fn builder() -> ImputerBuilder {
        ImputerBuilder::default()
    }

    pub fn config(&self) -> &ImputationConfig {
        &self.config
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    /// Impute every `NaN` cell of `raw`, a matrix of positive concentrations,
    /// given the per-column detection limits `bounds` in the same units.
    ///
    /// Neither input is modified. Observed cells are returned verbatim and
    /// every imputed cell is `<=` its column's detection limit.
    ///
    /// # Errors
    ///
    /// Every error is annotated with the stage that raised it; the inner
    /// [`ImputeError`] and its [`error_code`](ImputeError::error_code) are
    /// preserved. See [`ImputeError`] for the kinds.
    pub fn impute(&self, raw: &Matrix, bounds: &[f64]) -> Result<ImputationResult> {
        match self.impute_internal(raw, bounds) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Imputed {} censored cells",
                    result.mask.total_censored()
                )));
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Imputation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn impute_internal(&self, raw: &Matrix, bounds: &[f64]) -> Result<ImputationResult> {
        let start_time = Instant::now();
        let (n_rows, n_cols) = raw.shape();
        info!("Starting censored imputation: {} rows x {} columns", n_rows, n_cols);

        self.report_progress(ProgressUpdate::new(
            ImputationStage::Validating,
            0.0,
            "Validating input...",
        ));
        validate_input(raw, bounds).context("Validating input")?;
        let mask = CensorMask::from_missing(raw);
        info!(
            "{} censored cells across {} columns",
            mask.total_censored(),
            mask.censored_columns().len()
        );

        // The bound row would give an all-censored column a single value to scale by.
        check_observed(&mask).context("Initializing censored cells")?;

        // Step 1: log transform, then scale with the bounds as an extra row
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Transforming,
            0.0,
            "Log-transforming and scaling...",
        ));
        let log_bounds: Vec<f64> = bounds.iter().map(|b| b.ln()).collect();
        let stacked = raw
            .map(f64::ln)
            .with_appended_row(&log_bounds)
            .context("Transforming")?;
        let (scaled, params) =
            scaling::scale(&stacked, self.config.spread_policy()).context("Scaling")?;
        let (scaled, scaled_bounds) = scaled.split_last_row().context("Scaling")?;
        debug!("Scaled detection limits: {:?}", scaled_bounds);

        let mut rng = StdRng::seed_from_u64(self.config.seed);

        // Step 2: first complete estimate
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Initializing,
            0.0,
            "Drawing initial values for censored cells...",
        ));
        let initial = QrilcInitializer::new(self.config.tune_sigma)
            .initialize(&scaled, &mask, &scaled_bounds, &mut rng)
            .context("Initializing censored cells")?;

        // Step 3: block-Gibbs refinement
        let outer_cycles = self.config.outer_cycles;
        self.report_progress(ProgressUpdate::with_items(
            ImputationStage::Sweeping,
            format!("Cycle 0/{}", outer_cycles),
            0,
            outer_cycles,
            format!("Refining with {}...", self.predictor.name()),
        ));
        let scheduler = ImputationScheduler::new(
            ConditionalImputer::new(Arc::clone(&self.predictor)),
            self.config.inner_iters,
            outer_cycles,
        )
        .with_convergence_tol(self.config.convergence_tol);
        let outcome = scheduler
            .run(initial, &scaled_bounds, &mask, &mut rng, |summary| {
                self.report_progress(ProgressUpdate::with_items(
                    ImputationStage::Sweeping,
                    format!("Cycle {}/{}", summary.cycle, outer_cycles),
                    summary.cycle,
                    outer_cycles,
                    format!("Finished cycle {}", summary.cycle),
                ));
            })
            .context("Refining censored cells")?;

        // Step 4: back to raw units
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Recovering,
            0.0,
            "Recovering original units...",
        ));
        let recovered = scaling::recover(&outcome.estimate, params).context("Recovering units")?;
        let imputed = restore_raw(raw, &recovered.map(f64::exp), &mask, bounds);

        info!(
            "Imputation finished in {:.2?} after {} cycles",
            start_time.elapsed(),
            outcome.cycles.len()
        );

        Ok(ImputationResult {
            imputed,
            mask,
            cycles: outcome.cycles,
            seed: self.config.seed,
            converged_early: outcome.converged_early,
        })
    }
}

/// Check shapes and the log-transform domain before anything is computed.
fn validate_input(raw: &Matrix, bounds: &[f64]) -> Result<()> {
    if raw.is_empty() {
        return Err(ImputeError::EmptyInput);
    }
    if bounds.len() != raw.n_cols() {
        return Err(ImputeError::ShapeMismatch(format!(
            "{} detection limits for {} columns",
            bounds.len(),
            raw.n_cols()
        )));
    }

    for row in 0..raw.n_rows() {
        for (column, &value) in raw.row(row).iter().enumerate() {
            if !value.is_nan() && !(value.is_finite() && value > 0.0) {
                return Err(ImputeError::NonPositiveValue { row, column, value });
            }
        }
    }
    for (column, &value) in bounds.iter().enumerate() {
        if !(value.is_finite() && value > 0.0) {
            return Err(ImputeError::NonPositiveValue {
                row: BOUND_ROW,
                column,
                value,
            });
        }
    }
    Ok(())
}

/// Observed cells come from `raw` verbatim; imputed cells are capped at the limit.
fn restore_raw(
    raw: &Matrix,
    back_transformed: &Matrix,
    mask: &CensorMask,
    bounds: &[f64],
) -> Matrix {
    let mut out = raw.clone();
    for row in 0..raw.n_rows() {
        for (col, &bound) in bounds.iter().enumerate() {
            if mask.is_censored(row, col) {
                out.set(row, col, back_transformed.get(row, col).min(bound));
            }
        }
    }
    out
}

/// Builder for creating an [`Imputer`] with custom configuration.
#[derive(Default)]
pub struct ImputerBuilder {
    config: Option<ImputationConfig>,
    predictor: Option<Arc<dyn Predictor>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(ImputerBuilder: Send);

impl ImputerBuilder {
    /// Set the run configuration.
    pub fn config(mut self, config: ImputationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the regression used by the conditional imputer.
    ///
    /// Defaults to an [`ElasticNetCv`] built from the configuration.
    pub fn predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Set a progress reporter for receiving updates during a run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the imputer.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Imputer, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let predictor = self
            .predictor
            .unwrap_or_else(|| Arc::new(ElasticNetCv::from_config(&config)));

        Ok(Imputer {
            config,
            predictor,
            progress_reporter: self.progress_reporter,
        })
    }
}
