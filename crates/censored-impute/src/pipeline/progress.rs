//! Progress reporting for imputation runs.
//!
//! Runs are synchronous and not cancellable; a reporter only observes them.
//! The sweep stage dominates the run time and reports once per outer cycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use censored_impute::Imputer;
//!
//! let result = Imputer::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .impute(&raw, &bounds)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of an imputation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationStage {
    /// Checking shapes and the log-transform domain
    Validating,
    /// Log transform and scaling, bound row included
    Transforming,
    /// QRILC draws for every censored cell
    Initializing,
    /// Outer cycles of conditional refits
    Sweeping,
    /// Inverse scaling and exponentiation
    Recovering,
    /// Run finished successfully
    Complete,
    /// Run aborted with an error
    Failed,
}

impl ImputationStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Validating => "Validating Input",
            Self::Transforming => "Transforming",
            Self::Initializing => "Initializing Censored Cells",
            Self::Sweeping => "Refining Estimates",
            Self::Recovering => "Recovering Units",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall run (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::Validating => 0.02,
            Self::Transforming => 0.03,
            Self::Initializing => 0.05,
            Self::Sweeping => 0.85,
            Self::Recovering => 0.05,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Validating => 0.0,
            Self::Transforming => 0.02,
            Self::Initializing => 0.05,
            Self::Sweeping => 0.10,
            Self::Recovering => 0.95,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// Progress update emitted by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: ImputationStage,

    /// Optional sub-stage description (e.g., "Cycle 3/10")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Creates a new progress update for a stage without sub-stage info.
    pub fn new(stage: ImputationStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with item counts.
    pub fn with_items(
        stage: ImputationStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(ImputationStage::Complete, 1.0, message)
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ImputationStage::Failed, 0.0, message)
    }
}

/// Trait for receiving progress updates during a run.
///
/// Implementations must be `Send + Sync` so one reporter can observe runs
/// on several threads (e.g. one run per seed).
pub trait ProgressReporter: Send + Sync {
    /// Called at every stage boundary and once per outer cycle.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
