//! Custom error types for the censored imputation engine.
//!
//! This module provides the error hierarchy using `thiserror`. Every kind is
//! fatal for the run that raised it: the engine never substitutes a fallback
//! value for a column it cannot model.
//!
//! Errors are serializable so a caller can forward them as `{code, message}`
//! pairs (e.g. in the `--json` output of the CLI).

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// Row marker used by [`ImputeError::NonPositiveValue`] when the offending
/// value comes from the bound vector rather than the data matrix.
pub const BOUND_ROW: usize = usize::MAX;

/// The main error type for the imputation engine.
#[derive(Error, Debug)]
pub enum ImputeError {
    /// A value that must go through the log transform is zero, negative or not finite.
    #[error("{}", describe_non_positive(.row, .column, .value))]
    NonPositiveValue { row: usize, column: usize, value: f64 },

    /// A column has zero spread and the scaling policy forbids a fallback.
    #[error("Column {column} has zero spread and cannot be scaled")]
    DegenerateColumn { column: usize },

    /// A column has too few observed values to be modelled.
    #[error("Column {column} has {observed} observed values, at least {required} are required")]
    InsufficientData {
        column: usize,
        observed: usize,
        required: usize,
    },

    /// The regularized regression for a column could not be fit.
    #[error("Failed to fit predictor for column {column}: {reason}")]
    Fit { column: usize, reason: String },

    /// Matrix, mask or bound dimensions disagree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The input has no rows or no columns.
    #[error("Input matrix is empty")]
    EmptyInput,

    /// Invalid configuration or input layout.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Error annotated with the stage that raised it.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ImputeError>,
    },
}

fn describe_non_positive(row: &usize, column: &usize, value: &f64) -> String {
    if *row == BOUND_ROW {
        format!(
            "Detection limit for column {}: {} is not > 0 and cannot be log-transformed",
            column, value
        )
    } else {
        format!(
            "Value {} at row {}, column {} is not > 0 and cannot be log-transformed",
            value, row, column
        )
    }
}

impl ImputeError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ImputeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code, independent of the message text.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NonPositiveValue { .. } => "NON_POSITIVE_VALUE",
            Self::DegenerateColumn { .. } => "DEGENERATE_COLUMN",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::Fit { .. } => "FIT_ERROR",
            Self::ShapeMismatch(_) => "SHAPE_MISMATCH",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// The innermost error, skipping any context wrappers.
    pub fn root(&self) -> &ImputeError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Column the failure is attributed to, if any.
    pub fn column(&self) -> Option<usize> {
        match self.root() {
            Self::NonPositiveValue { column, .. }
            | Self::DegenerateColumn { column }
            | Self::InsufficientData { column, .. }
            | Self::Fit { column, .. } => Some(*column),
            _ => None,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ImputeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ImputeError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for imputation operations.
pub type Result<T> = std::result::Result<T, ImputeError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ImputeError::Polars(e).with_context(context))
    }
}
