//! Core data types: the dense matrix, the censoring mask and run results.

use crate::error::{ImputeError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Matrix
// ============================================================================

/// Dense row-major table of `f64` values (rows = samples, columns = variables).
///
/// Censored cells are represented by `NaN` on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`ImputeError::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(ImputeError::ShapeMismatch(format!(
                "{} values cannot fill a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Creates a matrix from a list of equally long rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ImputeError::ShapeMismatch(format!(
                    "row {idx} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Creates a matrix where every cell holds `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    /// Returns the shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Gets element at (row, col).
    ///
    /// # Panics
    ///
    /// Panics if indices are out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Sets element at (row, col).
    ///
    /// # Panics
    ///
    /// Panics if indices are out of bounds.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row.
    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Copy one column out.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Apply `f` to every cell, producing a new matrix.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            data: self.data.iter().map(|&v| f(v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Returns a copy with `row` appended at the bottom.
    pub fn with_appended_row(&self, row: &[f64]) -> Result<Self> {
        if row.len() != self.cols {
            return Err(ImputeError::ShapeMismatch(format!(
                "appended row has {} values, matrix has {} columns",
                row.len(),
                self.cols
            )));
        }
        let mut data = Vec::with_capacity(self.data.len() + self.cols);
        data.extend_from_slice(&self.data);
        data.extend_from_slice(row);
        Ok(Self {
            data,
            rows: self.rows + 1,
            cols: self.cols,
        })
    }

    /// Splits off the bottom row, returning the remaining matrix and that row.
    pub fn split_last_row(mut self) -> Result<(Self, Vec<f64>)> {
        if self.rows == 0 {
            return Err(ImputeError::EmptyInput);
        }
        let last = self.data.split_off((self.rows - 1) * self.cols);
        self.rows -= 1;
        Ok((self, last))
    }

    /// Copies the columns listed in `keep`, in that order, into a new matrix.
    pub fn select_columns(&self, keep: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.rows * keep.len());
        for row in 0..self.rows {
            for &col in keep {
                data.push(self.get(row, col));
            }
        }
        Self {
            data,
            rows: self.rows,
            cols: keep.len(),
        }
    }
}

// ============================================================================
// Censor mask
// ============================================================================

/// Boolean table parallel to a [`Matrix`], true where a cell was censored.
///
/// Built once from the raw input and never recomputed: a cell that is later
/// imputed to any value stays flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensorMask {
    flags: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl CensorMask {
    /// Flags every `NaN` cell of `matrix`.
    pub fn from_missing(matrix: &Matrix) -> Self {
        Self {
            flags: matrix.as_slice().iter().map(|v| v.is_nan()).collect(),
            rows: matrix.n_rows(),
            cols: matrix.n_cols(),
        }
    }

    /// Creates a mask from row-major flags.
    pub fn new(rows: usize, cols: usize, flags: Vec<bool>) -> Result<Self> {
        if flags.len() != rows * cols {
            return Err(ImputeError::ShapeMismatch(format!(
                "{} flags cannot fill a {rows}x{cols} mask",
                flags.len()
            )));
        }
        Ok(Self { flags, rows, cols })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn is_censored(&self, row: usize, col: usize) -> bool {
        self.flags[row * self.cols + col]
    }

    /// Rows censored in `col`, ascending.
    pub fn censored_rows(&self, col: usize) -> Vec<usize> {
        (0..self.rows)
            .filter(|&row| self.is_censored(row, col))
            .collect()
    }

    pub fn censored_in_column(&self, col: usize) -> usize {
        (0..self.rows).filter(|&row| self.is_censored(row, col)).count()
    }

    /// Columns holding at least one censored cell, ascending.
    pub fn censored_columns(&self) -> Vec<usize> {
        (0..self.cols)
            .filter(|&col| self.censored_in_column(col) > 0)
            .collect()
    }

    pub fn total_censored(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    /// Errors unless the mask has the same shape as `matrix`.
    pub fn ensure_matches(&self, matrix: &Matrix) -> Result<()> {
        if self.shape() != matrix.shape() {
            return Err(ImputeError::ShapeMismatch(format!(
                "mask is {:?}, matrix is {:?}",
                self.shape(),
                matrix.shape()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Run results
// ============================================================================

/// Per-cycle diagnostic recorded by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// One-based outer cycle index.
    pub cycle: usize,
    /// Mean of the censored cells of each column in transform space
    /// (`None` for columns without censored cells).
    pub censored_means: Vec<Option<f64>>,
    /// Largest absolute change of those means against the previous cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_change: Option<f64>,
}

/// Output of a full imputation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationResult {
    /// Imputed matrix in raw units, same shape as the input.
    pub imputed: Matrix,
    /// Cells that were censored in the input.
    pub mask: CensorMask,
    /// One entry per completed outer cycle.
    pub cycles: Vec<CycleSummary>,
    /// Seed the run was drawn from.
    pub seed: u64,
    /// Whether the run stopped before the cycle budget on `convergence_tol`.
    pub converged_early: bool,
}

impl ImputationResult {
    /// Compact, serializable description of the run.
    pub fn summary(&self) -> ImputationSummary {
        let (rows, columns) = self.imputed.shape();
        ImputationSummary {
            rows,
            columns,
            censored_cells: self.mask.total_censored(),
            censored_per_column: (0..columns)
                .map(|col| self.mask.censored_in_column(col))
                .collect(),
            cycles_run: self.cycles.len(),
            final_max_change: self.cycles.last().and_then(|c| c.max_change),
            converged_early: self.converged_early,
            seed: self.seed,
        }
    }
}

/// Human-readable summary of a run, for logs and the CLI `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationSummary {
    pub rows: usize,
    pub columns: usize,
    pub censored_cells: usize,
    pub censored_per_column: Vec<usize>,
    pub cycles_run: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_max_change: Option<f64>,
    pub converged_early: bool,
    pub seed: u64,
}
