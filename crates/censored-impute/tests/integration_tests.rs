//! Integration tests for censored imputation.
//!
//! These tests verify end-to-end behavior of the imputer on the CSV fixtures.

use censored_impute::frame::{bounds_from_frame, frame_to_matrix, read_csv};
use censored_impute::{
    BOUND_ROW, ElasticNetCv, FitError, FittedModel, ImputationConfig, ImputeError, Imputer,
    Matrix, Predictor,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_frame(filename: &str) -> DataFrame {
    read_csv(fixtures_path().join(filename)).expect("Failed to read CSV file")
}

fn load_fixture(data_file: &str, bounds_file: &str) -> (Matrix, Vec<f64>) {
    let data = load_frame(data_file);
    let bounds = bounds_from_frame(&load_frame(bounds_file), &data).unwrap();
    (frame_to_matrix(&data).unwrap(), bounds)
}

fn imputer(inner_iters: usize, outer_cycles: usize, seed: u64) -> Imputer {
    Imputer::builder()
        .config(
            ImputationConfig::builder()
                .inner_iters(inner_iters)
                .outer_cycles(outer_cycles)
                .seed(seed)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

/// Solve a 3x3 system by Gaussian elimination with partial pivoting.
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> [f64; 3] {
    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap();
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in 0..3 {
            if row != col {
                let f = a[row][col] / a[col][col];
                for k in col..3 {
                    a[row][k] -= f * a[col][k];
                }
                b[row] -= f * b[col];
            }
        }
    }
    [b[0] / a[0][0], b[1] / a[1][1], b[2] / a[2][2]]
}

fn sample_variance(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Returns the target mean with a tiny residual variance, and counts fits.
#[derive(Debug, Default)]
struct MeanPredictor {
    fits: AtomicUsize,
}

#[derive(Debug)]
struct MeanModel(f64);

impl FittedModel for MeanModel {
    fn predict(&self, _row: &[f64]) -> f64 {
        self.0
    }

    fn residual_variance(&self) -> f64 {
        1e-12
    }
}

impl Predictor for MeanPredictor {
    fn fit(
        &self,
        _design: &Matrix,
        target: &[f64],
        _rng: &mut dyn RngCore,
    ) -> Result<Box<dyn FittedModel>, FitError> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        let mean = target.iter().sum::<f64>() / target.len() as f64;
        Ok(Box::new(MeanModel(mean)))
    }

    fn name(&self) -> &str {
        "mean"
    }
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_correlated_scenario_tracks_regression_prediction() {
    let (raw, bounds) = load_fixture("correlated.csv", "correlated_bounds.csv");
    assert_eq!(raw.shape(), (10, 3));

    // Reference: OLS of ln a on [1, ln b, ln c] over the observed rows.
    let observed: Vec<usize> = (2..10).collect();
    let mut xtx = [[0.0; 3]; 3];
    let mut xty = [0.0; 3];
    for &row in &observed {
        let x = [1.0, raw.get(row, 1).ln(), raw.get(row, 2).ln()];
        let y = raw.get(row, 0).ln();
        for i in 0..3 {
            for j in 0..3 {
                xtx[i][j] += x[i] * x[j];
            }
            xty[i] += x[i] * y;
        }
    }
    let beta = solve3(xtx, xty);
    let predict =
        |row: usize| beta[0] + beta[1] * raw.get(row, 1).ln() + beta[2] * raw.get(row, 2).ln();
    let rss: f64 = observed
        .iter()
        .map(|&row| (raw.get(row, 0).ln() - predict(row)).powi(2))
        .sum();
    let sigma = (rss / (observed.len() - 3) as f64).sqrt();
    let low = predict(0).min(predict(1)) - 3.0 * sigma;
    let high = predict(0).max(predict(1)) + 3.0 * sigma;

    let config = ImputationConfig::builder()
        .inner_iters(5)
        .outer_cycles(3)
        .cv_folds(5)
        .seed(42)
        .build()
        .unwrap();
    let result = Imputer::builder()
        .config(config)
        .build()
        .unwrap()
        .impute(&raw, &bounds)
        .unwrap();

    for row in 0..2 {
        let value = result.imputed.get(row, 0);
        assert!(value > 0.0 && value <= 1.0, "row {} imputed {}", row, value);
        let log_value = value.ln();
        assert!(
            (low..=high).contains(&log_value),
            "row {}: ln {} outside [{}, {}]",
            row,
            log_value,
            low,
            high
        );
    }
    assert_eq!(result.cycles.len(), 3);
    assert_eq!(result.mask.total_censored(), 2);
}

#[test]
fn test_observed_cells_untouched() {
    let (raw, bounds) = load_fixture("abundant.csv", "abundant_bounds.csv");
    let result = imputer(3, 2, 11).impute(&raw, &bounds).unwrap();

    for row in 0..raw.n_rows() {
        for col in 0..raw.n_cols() {
            if !result.mask.is_censored(row, col) {
                assert_eq!(
                    result.imputed.get(row, col).to_bits(),
                    raw.get(row, col).to_bits(),
                    "observed cell ({}, {}) changed",
                    row,
                    col
                );
            }
        }
    }
}

#[test]
fn test_imputed_values_respect_detection_limits() {
    let (raw, bounds) = load_fixture("abundant.csv", "abundant_bounds.csv");
    let result = imputer(3, 2, 5).impute(&raw, &bounds).unwrap();

    assert_eq!(result.mask.censored_in_column(0), 6);
    assert_eq!(result.mask.censored_in_column(1), 0);
    assert_eq!(result.mask.censored_in_column(2), 3);

    for row in 0..raw.n_rows() {
        for (col, &bound) in bounds.iter().enumerate() {
            let value = result.imputed.get(row, col);
            assert!(value.is_finite(), "({}, {}) is {}", row, col, value);
            if result.mask.is_censored(row, col) {
                assert!(
                    value > 0.0 && value <= bound,
                    "({}, {}) = {} outside (0, {}]",
                    row,
                    col,
                    value,
                    bound
                );
            }
        }
    }
}

#[test]
fn test_same_seed_is_bit_identical() {
    let (raw, bounds) = load_fixture("abundant.csv", "abundant_bounds.csv");
    let first = imputer(3, 2, 99).impute(&raw, &bounds).unwrap();
    let second = imputer(3, 2, 99).impute(&raw, &bounds).unwrap();

    let bits = |m: &Matrix| m.as_slice().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first.imputed), bits(&second.imputed));
    assert_eq!(first.cycles, second.cycles);
}

#[test]
fn test_different_seeds_give_different_draws() {
    let (raw, bounds) = load_fixture("abundant.csv", "abundant_bounds.csv");
    let first = imputer(3, 2, 1).impute(&raw, &bounds).unwrap();
    let second = imputer(3, 2, 2).impute(&raw, &bounds).unwrap();

    assert_ne!(first.imputed, second.imputed);
}

#[test]
fn test_parallel_runs_share_one_imputer() {
    let (raw, bounds) = load_fixture("correlated.csv", "correlated_bounds.csv");
    let shared = Arc::new(imputer(2, 2, 17));

    let outputs: Vec<Matrix> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let imputer = Arc::clone(&shared);
                let (raw, bounds) = (&raw, &bounds);
                scope.spawn(move || imputer.impute(raw, bounds).unwrap().imputed)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_later_cycles_stay_stable() {
    let (raw, bounds) = load_fixture("abundant.csv", "abundant_bounds.csv");
    let censored_a = |m: &Matrix| -> Vec<f64> {
        (0..m.n_rows())
            .filter(|&row| raw.get(row, 0).is_nan())
            .map(|row| m.get(row, 0).ln())
            .collect()
    };

    let short = imputer(3, 2, 3).impute(&raw, &bounds).unwrap();
    let long = imputer(3, 8, 3).impute(&raw, &bounds).unwrap();

    let short_var = sample_variance(&censored_a(&short.imputed));
    let long_var = sample_variance(&censored_a(&long.imputed));
    assert!(
        long_var <= short_var + 0.25,
        "spread grew from {} to {}",
        short_var,
        long_var
    );

    assert_eq!(long.cycles.len(), 8);
    let tail: Vec<f64> = long.cycles[4..]
        .iter()
        .map(|c| c.censored_means[0].unwrap())
        .collect();
    let spread = tail.iter().cloned().fold(f64::MIN, f64::max)
        - tail.iter().cloned().fold(f64::MAX, f64::min);
    assert!(spread <= 1.0, "censored means wander by {}: {:?}", spread, tail);
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_all_censored_column_fails_in_initializer() {
    let raw = Matrix::from_rows(&[
        vec![1.2, f64::NAN, 3.0],
        vec![2.5, f64::NAN, 2.0],
        vec![0.7, f64::NAN, 4.1],
        vec![1.9, f64::NAN, 2.8],
    ])
    .unwrap();

    let err = imputer(2, 1, 0).impute(&raw, &[0.5, 0.5, 0.5]).unwrap_err();

    assert_eq!(err.error_code(), "INSUFFICIENT_DATA");
    assert_eq!(err.column(), Some(1));
    assert!(err.to_string().starts_with("Initializing censored cells"));
    assert!(matches!(
        err.root(),
        ImputeError::InsufficientData { observed: 0, required: 2, .. }
    ));
}

#[test]
fn test_non_positive_values_rejected_before_transform() {
    let reports = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reports);
    let imputer = Imputer::builder()
        .on_progress(move |update| {
            if update.stage == censored_impute::ImputationStage::Transforming {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build()
        .unwrap();

    let zero = Matrix::from_rows(&[vec![1.0, f64::NAN], vec![0.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let err = imputer.impute(&zero, &[1.0, 1.0]).unwrap_err();
    assert_eq!(err.error_code(), "NON_POSITIVE_VALUE");
    assert!(matches!(
        err.root(),
        ImputeError::NonPositiveValue { row: 1, column: 0, .. }
    ));

    let negative =
        Matrix::from_rows(&[vec![1.0, f64::NAN], vec![2.0, -2.0], vec![3.0, 4.0]]).unwrap();
    let err = imputer.impute(&negative, &[1.0, 1.0]).unwrap_err();
    assert_eq!(err.column(), Some(1));

    let fine = Matrix::from_rows(&[vec![1.0, f64::NAN], vec![2.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let err = imputer.impute(&fine, &[1.0, 0.0]).unwrap_err();
    assert!(matches!(
        err.root(),
        ImputeError::NonPositiveValue { row: BOUND_ROW, column: 1, .. }
    ));

    assert_eq!(reports.load(Ordering::SeqCst), 0);
}

#[test]
fn test_all_censored_column_fails_in_initializer_without_fallback_spread() {
    let raw = Matrix::from_rows(&[
        vec![1.2, f64::NAN, 3.0],
        vec![2.5, f64::NAN, 2.0],
        vec![0.7, f64::NAN, 4.1],
        vec![1.9, f64::NAN, 2.8],
        vec![1.4, f64::NAN, 3.3],
        vec![2.2, f64::NAN, 2.4],
        vec![0.9, f64::NAN, 3.9],
        vec![1.6, f64::NAN, 3.1],
    ])
    .unwrap();
    let config = ImputationConfig::builder()
        .inner_iters(2)
        .outer_cycles(1)
        .fallback_spread(None)
        .build()
        .unwrap();

    let err = Imputer::builder()
        .config(config)
        .build()
        .unwrap()
        .impute(&raw, &[0.5, 0.5, 0.5])
        .unwrap_err();

    assert_eq!(err.error_code(), "INSUFFICIENT_DATA");
    assert!(err.to_string().starts_with("Initializing censored cells"));
    assert!(matches!(
        err.root(),
        ImputeError::InsufficientData { column: 1, observed: 0, required: 2 }
    ));
}

#[test]
fn test_fewer_rows_than_folds_is_fit_error() {
    let raw = Matrix::from_rows(&[
        vec![f64::NAN, 1.0],
        vec![1.5, 2.0],
        vec![2.5, 3.5],
        vec![3.0, 4.0],
    ])
    .unwrap();

    let err = imputer(1, 1, 0).impute(&raw, &[1.0, 0.5]).unwrap_err();

    assert_eq!(err.error_code(), "FIT_ERROR");
    assert_eq!(err.column(), Some(0));
    assert!(err.to_string().contains("4 rows cannot be split into 5 cross-validation folds"));
}

#[test]
fn test_bounds_length_must_match_columns() {
    let (raw, _) = load_fixture("correlated.csv", "correlated_bounds.csv");
    let err = imputer(1, 1, 0).impute(&raw, &[1.0, 0.5]).unwrap_err();
    assert_eq!(err.error_code(), "SHAPE_MISMATCH");
}

// ============================================================================
// Configuration and Predictor Tests
// ============================================================================

#[test]
fn test_custom_predictor_is_used_for_every_refinement() {
    let (raw, bounds) = load_fixture("correlated.csv", "correlated_bounds.csv");
    let predictor = Arc::new(MeanPredictor::default());

    let result = Imputer::builder()
        .config(
            ImputationConfig::builder()
                .inner_iters(2)
                .outer_cycles(3)
                .build()
                .unwrap(),
        )
        .predictor(predictor.clone())
        .build()
        .unwrap()
        .impute(&raw, &bounds)
        .unwrap();

    // one censored column, 2 refinements per cycle, 3 cycles
    assert_eq!(predictor.fits.load(Ordering::SeqCst), 6);
    for row in 0..2 {
        assert!(result.imputed.get(row, 0) <= bounds[0]);
    }
}

#[test]
fn test_lasso_only_predictor() {
    let (raw, bounds) = load_fixture("abundant.csv", "abundant_bounds.csv");
    let lasso = ElasticNetCv::new(vec![1.0]).with_folds(3);

    let imputer = Imputer::builder()
        .config(
            ImputationConfig::builder()
                .inner_iters(2)
                .outer_cycles(2)
                .build()
                .unwrap(),
        )
        .predictor(Arc::new(lasso))
        .build()
        .unwrap();
    assert_eq!(imputer.predictor().name(), "elastic-net-cv");

    let result = imputer.impute(&raw, &bounds).unwrap();
    assert_eq!(result.cycles.len(), 2);
}

#[test]
fn test_convergence_tolerance_stops_early() {
    let (raw, bounds) = load_fixture("correlated.csv", "correlated_bounds.csv");

    let result = Imputer::builder()
        .config(
            ImputationConfig::builder()
                .inner_iters(2)
                .outer_cycles(5)
                .convergence_tol(1e6)
                .build()
                .unwrap(),
        )
        .predictor(Arc::new(MeanPredictor::default()))
        .build()
        .unwrap()
        .impute(&raw, &bounds)
        .unwrap();

    assert_eq!(result.cycles.len(), 1);
    assert!(result.converged_early);
    assert!(result.summary().converged_early);
}

#[test]
fn test_fixed_budget_without_tolerance() {
    let (raw, bounds) = load_fixture("correlated.csv", "correlated_bounds.csv");

    let result = Imputer::builder()
        .config(
            ImputationConfig::builder()
                .inner_iters(1)
                .outer_cycles(4)
                .build()
                .unwrap(),
        )
        .predictor(Arc::new(MeanPredictor::default()))
        .build()
        .unwrap()
        .impute(&raw, &bounds)
        .unwrap();

    let indices: Vec<usize> = result.cycles.iter().map(|c| c.cycle).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert!(!result.converged_early);
}

// ============================================================================
// DataFrame and Serialization Tests
// ============================================================================

#[test]
fn test_impute_frame_from_csv() {
    let data = load_frame("correlated.csv");
    let bounds = bounds_from_frame(&load_frame("correlated_bounds.csv"), &data).unwrap();

    let outcome = imputer(2, 2, 42).impute_frame(&data, &bounds).unwrap();

    assert_eq!(outcome.imputed.shape(), (10, 3));
    assert_eq!(outcome.imputed.get_column_names_str(), vec!["a", "b", "c"]);
    assert_eq!(outcome.imputed.column("a").unwrap().null_count(), 0);

    let mask_a = outcome.mask.column("a").unwrap().bool().unwrap();
    assert_eq!(mask_a.get(0), Some(true));
    assert_eq!(mask_a.get(1), Some(true));
    assert_eq!(mask_a.get(2), Some(false));
    assert!(!outcome.mask.column("b").unwrap().bool().unwrap().any());

    let b = outcome.imputed.column("b").unwrap().f64().unwrap();
    assert_eq!(b.get(0), Some(2.0138));
}

#[test]
fn test_summary_serializes_to_json() {
    let (raw, bounds) = load_fixture("correlated.csv", "correlated_bounds.csv");
    let result = imputer(2, 3, 42).impute(&raw, &bounds).unwrap();

    let json = serde_json::to_value(result.summary()).unwrap();
    assert_eq!(json["rows"], 10);
    assert_eq!(json["columns"], 3);
    assert_eq!(json["censored_cells"], 2);
    assert_eq!(json["censored_per_column"], serde_json::json!([2, 0, 0]));
    assert_eq!(json["cycles_run"], 3);
    assert_eq!(json["seed"], 42);
    assert_eq!(json["converged_early"], false);
}

#[test]
fn test_error_serializes_with_code() {
    let raw = Matrix::from_rows(&[vec![f64::NAN, 1.0], vec![f64::NAN, 2.0]]).unwrap();
    let err = imputer(1, 1, 0).impute(&raw, &[1.0, 1.0]).unwrap_err();

    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["code"], "INSUFFICIENT_DATA");
    assert!(json["message"].as_str().unwrap().contains("Column 0"));
}
