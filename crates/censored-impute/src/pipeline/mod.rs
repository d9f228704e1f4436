//! Pipeline module.
//!
//! This module provides the imputation pipeline, the sweep scheduler and
//! progress reporting.

mod builder;
pub mod progress;
mod scheduler;

pub use builder::{Imputer, ImputerBuilder};
pub use progress::{ClosureProgressReporter, ImputationStage, ProgressReporter, ProgressUpdate};
pub use scheduler::{ImputationScheduler, SchedulerOutcome};
