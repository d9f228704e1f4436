//! Imputation stages for left-censored values.
//!
//! This module provides:
//! - QRILC initialization of every censored cell ([`QrilcInitializer`])
//! - The regression-and-redraw Gibbs step ([`ConditionalImputer`])
//! - Upper-truncated normal sampling shared by both

mod conditional;
mod qrilc;
pub mod truncated;

pub use conditional::ConditionalImputer;
pub use qrilc::{MIN_OBSERVED, QrilcInitializer, TailFit, check_observed, fit_tail};
