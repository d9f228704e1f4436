//! Block-Gibbs sweep scheduling.
//!
//! A run moves `Initialized -> Sweeping* -> Converged`. Every outer cycle
//! visits each censored column once in ascending order and refines it
//! `inner_iters` times before moving on, so each column settles against the
//! latest values of the others. There is no retry state: the first failing
//! refinement aborts the run.

use crate::error::{ImputeError, Result};
use crate::imputers::ConditionalImputer;
use crate::types::{CensorMask, CycleSummary, Matrix};
use rand::RngCore;
use tracing::{debug, info};

/// Final working state of a scheduler run.
#[derive(Debug, Clone)]
pub struct SchedulerOutcome {
    pub estimate: Matrix,
    pub cycles: Vec<CycleSummary>,
    /// True when `convergence_tol` ended the run before the last cycle.
    pub converged_early: bool,
}

/// Drives [`ConditionalImputer`] over every censored column.
#[derive(Debug, Clone)]
pub struct ImputationScheduler {
    imputer: ConditionalImputer,
    inner_iters: usize,
    outer_cycles: usize,
    convergence_tol: Option<f64>,
}

impl ImputationScheduler {
    pub fn new(imputer: ConditionalImputer, inner_iters: usize, outer_cycles: usize) -> Self {
        Self {
            imputer,
            inner_iters,
            outer_cycles,
            convergence_tol: None,
        }
    }

    /// Stop once the censored-cell column means move less than `tol` in a cycle.
    pub fn with_convergence_tol(mut self, tol: Option<f64>) -> Self {
        self.convergence_tol = tol;
        self
    }

    /// Run the sweeps on `working`, which must already hold a value in every
    /// censored cell. `on_cycle` sees each cycle's summary as it completes.
    pub fn run(
        &self,
        mut working: Matrix,
        bounds: &[f64],
        mask: &CensorMask,
        rng: &mut dyn RngCore,
        mut on_cycle: impl FnMut(&CycleSummary),
    ) -> Result<SchedulerOutcome> {
        mask.ensure_matches(&working)?;
        if bounds.len() != working.n_cols() {
            return Err(ImputeError::ShapeMismatch(format!(
                "{} bounds for {} columns",
                bounds.len(),
                working.n_cols()
            )));
        }

        let columns = mask.censored_columns();
        info!(
            "Sweeping {} censored columns: {} cycles x {} refits",
            columns.len(),
            self.outer_cycles,
            self.inner_iters
        );

        let mut previous = censored_means(&working, mask);
        let mut cycles = Vec::with_capacity(self.outer_cycles);
        let mut converged_early = false;

        for cycle in 0..self.outer_cycles {
            for &col in &columns {
                for _ in 0..self.inner_iters {
                    self.imputer
                        .refine(&mut working, col, mask, bounds[col], rng)
                        .map_err(|e| {
                            e.with_context(format!("cycle {}, column {}", cycle + 1, col))
                        })?;
                }
            }

            let means = censored_means(&working, mask);
            let max_change = largest_change(&previous, &means);
            debug!(
                "Cycle {}/{}: max change in censored means {:?}",
                cycle + 1,
                self.outer_cycles,
                max_change
            );

            let summary = CycleSummary {
                cycle: cycle + 1,
                censored_means: means.clone(),
                max_change,
            };
            on_cycle(&summary);
            cycles.push(summary);
            previous = means;

            if let (Some(tol), Some(change)) = (self.convergence_tol, max_change)
                && change < tol
            {
                converged_early = cycle + 1 < self.outer_cycles;
                info!("Converged after {} cycles (max change {:.3e})", cycle + 1, change);
                break;
            }
        }

        Ok(SchedulerOutcome {
            estimate: working,
            cycles,
            converged_early,
        })
    }
}

/// Mean of the censored cells of every column; `None` for columns without any.
pub(crate) fn censored_means(working: &Matrix, mask: &CensorMask) -> Vec<Option<f64>> {
    (0..working.n_cols())
        .map(|col| {
            let rows = mask.censored_rows(col);
            if rows.is_empty() {
                None
            } else {
                Some(rows.iter().map(|&r| working.get(r, col)).sum::<f64>() / rows.len() as f64)
            }
        })
        .collect()
}

fn largest_change(before: &[Option<f64>], after: &[Option<f64>]) -> Option<f64> {
    before
        .iter()
        .zip(after)
        .filter_map(|(b, a)| Some((a.as_ref()? - b.as_ref()?).abs()))
        .reduce(f64::max)
}
