//! Conversion between polars [`DataFrame`]s and [`Matrix`].
//!
//! Every column of the frame is a variable; nulls and `NaN` cells are
//! censored. Detection limits come from a one-row frame with the same
//! headers.

use crate::error::{ImputeError, Result, ResultExt};
use crate::pipeline::Imputer;
use crate::types::{CensorMask, ImputationResult, Matrix};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Read every column of `df` into a matrix. Null and `NaN` cells become `NaN`.
///
/// # Errors
///
/// [`ImputeError::InvalidConfig`] if a column is not numeric.
pub fn frame_to_matrix(df: &DataFrame) -> Result<Matrix> {
    let (n_rows, n_cols) = df.shape();
    let mut data = vec![f64::NAN; n_rows * n_cols];

    for (col_idx, column) in df.get_columns().iter().enumerate() {
        if !is_numeric_dtype(column.dtype()) {
            return Err(ImputeError::InvalidConfig(format!(
                "Column '{}' has non-numeric type {}",
                column.name(),
                column.dtype()
            )));
        }
        let casted = column
            .cast(&DataType::Float64)
            .context(format!("Casting column '{}'", column.name()))?;
        let values = casted
            .f64()
            .context(format!("Reading column '{}'", column.name()))?;
        for (row, value) in values.into_iter().enumerate() {
            if let Some(v) = value {
                data[row * n_cols + col_idx] = v;
            }
        }
    }

    Matrix::new(n_rows, n_cols, data)
}

/// Build a frame with one `Float64` column per matrix column.
pub fn matrix_to_frame(matrix: &Matrix, names: &[PlSmallStr]) -> Result<DataFrame> {
    if names.len() != matrix.n_cols() {
        return Err(ImputeError::ShapeMismatch(format!(
            "{} column names for {} columns",
            names.len(),
            matrix.n_cols()
        )));
    }
    let columns: Vec<Column> = names
        .iter()
        .enumerate()
        .map(|(col, name)| Column::new(name.clone(), matrix.column(col)))
        .collect();
    DataFrame::new(columns).context("Building imputed frame")
}

/// Build a frame of `Boolean` columns, true where a cell was censored.
pub fn mask_to_frame(mask: &CensorMask, names: &[PlSmallStr]) -> Result<DataFrame> {
    let (n_rows, n_cols) = mask.shape();
    if names.len() != n_cols {
        return Err(ImputeError::ShapeMismatch(format!(
            "{} column names for {} columns",
            names.len(),
            n_cols
        )));
    }
    let columns: Vec<Column> = names
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let flags: Vec<bool> = (0..n_rows).map(|row| mask.is_censored(row, col)).collect();
            Column::new(name.clone(), flags)
        })
        .collect();
    DataFrame::new(columns).context("Building mask frame")
}

/// Look up the detection limit of every column of `data` in the one-row
/// frame `bounds`, matching by column name.
pub fn bounds_from_frame(bounds: &DataFrame, data: &DataFrame) -> Result<Vec<f64>> {
    if bounds.height() != 1 {
        return Err(ImputeError::InvalidConfig(format!(
            "Detection limits must be a single row, found {}",
            bounds.height()
        )));
    }

    data.get_column_names()
        .into_iter()
        .map(|name| {
            let column = bounds.column(name.as_str()).map_err(|_| {
                ImputeError::InvalidConfig(format!("No detection limit for column '{}'", name))
            })?;
            let casted = column
                .cast(&DataType::Float64)
                .context(format!("Casting detection limit '{}'", name))?;
            casted
                .f64()
                .context(format!("Reading detection limit '{}'", name))?
                .get(0)
                .ok_or_else(|| {
                    ImputeError::InvalidConfig(format!(
                    "Detection limit for column '{}' is empty",
                    name
                ))
                })
        })
        .collect()
}

/// Read a CSV file with a header row. Empty fields become nulls.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .context(format!("Reading {}", path.display()))
}

/// Write `df` as a comma-separated file with a header row, creating parent
/// directories as needed.
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .context(format!("Writing {}", path.display()))
}

/// Imputed frame plus the censoring mask and run diagnostics.
#[derive(Debug, Clone)]
pub struct FrameImputation {
    /// Same columns and order as the input, all `Float64`.
    pub imputed: DataFrame,
    /// `Boolean` columns, true where the input cell was censored.
    pub mask: DataFrame,
    pub result: ImputationResult,
}

impl Imputer {
    /// Impute a frame of concentrations. `bounds` holds one detection limit
    /// per column, in column order.
    pub fn impute_frame(&self, df: &DataFrame, bounds: &[f64]) -> Result<FrameImputation> {
        let names: Vec<PlSmallStr> = df.get_column_names().into_iter().cloned().collect();
        let raw = frame_to_matrix(df).context("Reading frame")?;
        debug!("Frame {:?} converted, columns {:?}", raw.shape(), names);

        let result = self.impute(&raw, bounds)?;
        Ok(FrameImputation {
            imputed: matrix_to_frame(&result.imputed, &names)?,
            mask: mask_to_frame(&result.mask, &names)?,
            result,
        })
    }
}
