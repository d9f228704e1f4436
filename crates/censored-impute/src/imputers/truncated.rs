//! Upper-truncated normal sampling.
//!
//! Draws use the inverse CDF while the truncation point is within a few
//! standard deviations of the mean. Further out in the lower tail the CDF
//! underflows, so Robert's (1995) exponential rejection sampler is used.

use rand::{Rng, RngCore};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

/// Standardized truncation point below which the tail sampler takes over.
const TAIL_SWITCH: f64 = -5.0;

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Standard normal quantile (inverse CDF) for `p` in `(0, 1)`.
pub fn normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Draw from `N(mean, sd^2)` conditioned on the value being `<= upper`.
///
/// A zero, negative or non-finite `sd` collapses the distribution to a point
/// and returns `min(mean, upper)`.
pub fn sample_upper_truncated(rng: &mut dyn RngCore, mean: f64, sd: f64, upper: f64) -> f64 {
    if !(sd.is_finite() && sd > 0.0) {
        return mean.min(upper);
    }

    let b = (upper - mean) / sd;
    let z = if b < TAIL_SWITCH {
        -sample_lower_bounded(rng, -b)
    } else {
        let p_upper = normal_cdf(b);
        // (0, 1] keeps the quantile finite on the low end
        let u = 1.0 - rng.r#gen::<f64>();
        normal_quantile(u * p_upper).min(b)
    };

    (mean + sd * z).min(upper)
}

/// Standard normal conditioned on `z >= a`, for `a > 0`.
fn sample_lower_bounded(rng: &mut dyn RngCore, a: f64) -> f64 {
    let alpha = (a + (a * a + 4.0).sqrt()) / 2.0;
    loop {
        let u = 1.0 - rng.r#gen::<f64>();
        let z = a - u.ln() / alpha;
        let rho = (-(z - alpha).powi(2) / 2.0).exp();
        if rng.r#gen::<f64>() <= rho {
            return z;
        }
    }
}
