//! Automatic batch size and step size for SVRG.
//!
//! Follows the theory-driven defaults of Sebbouh et al. (2019) for
//! mini-batch SVRG: both depend on the expected smoothness `L` of the full
//! loss, the maximum per-sample smoothness `L_max`, and optionally the
//! strong convexity `μ`.
//!
//! For a Poisson GLM with softplus inverse link the Hessian is bounded by
//! `XᵀDX / n` with `D = diag(0.17 y + 0.25)`, which gives both constants
//! without forming the Hessian.

use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

pub const DEFAULT_POWER_ITERS: usize = 20;

/// Batch size and step size picked for SVRG. `None` means no valid value
/// could be determined and the solver must fall back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvrgDefaults {
    pub batch_size: Option<usize>,
    pub stepsize: Option<f64>,
}

/// Append a column of ones so the intercept is part of the design.
pub fn with_intercept_column(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let ones = Array2::ones((x.nrows(), 1));
    concatenate(Axis(1), &[x, ones.view()]).unwrap_or_else(|_| x.to_owned())
}

fn softplus_poisson_diag(y: ArrayView1<'_, f64>) -> Array1<f64> {
    y.mapv(|v| 0.17 * v + 0.25)
}

/// `XᵀDX v / n` without materialising `XᵀDX`.
pub fn glm_softplus_poisson_l_smooth_multiply(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    v: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let d = softplus_poisson_diag(y);
    let xv = x.dot(&v) * &d;
    x.t().dot(&xv) / x.nrows().max(1) as f64
}

/// Largest eigenvalue of `XᵀDX / n` by power iteration.
pub fn glm_softplus_poisson_l_smooth_with_power_iteration(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    n_power_iters: usize,
) -> f64 {
    let mut rng = StdRng::seed_from_u64(123);
    let mut v: Array1<f64> = (0..x.ncols()).map(|_| rng.gen_range(0.5..1.5)).collect();
    let norm = v.dot(&v).sqrt();
    v /= norm;

    for _ in 0..n_power_iters {
        let next = glm_softplus_poisson_l_smooth_multiply(x, y, v.view());
        let norm = next.dot(&next).sqrt();
        if norm == 0.0 {
            return 0.0;
        }
        v = next / norm;
    }

    // Rayleigh quotient of the unit vector.
    v.dot(&glm_softplus_poisson_l_smooth_multiply(x, y, v.view()))
}

/// Maximum per-sample smoothness `max_i d_i ||x_i||²`.
pub fn glm_softplus_poisson_l_smooth_max(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let d = softplus_poisson_diag(y);
    let mut out = 0.0_f64;
    Zip::from(x.rows()).and(&d).for_each(|row, &di| {
        out = out.max(di * row.dot(&row));
    });
    out
}

/// `(L_max, L)` for a softplus-Poisson GLM.
pub fn glm_softplus_poisson_l_max_and_l(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    n_power_iters: usize,
) -> (f64, f64) {
    let l_smooth = glm_softplus_poisson_l_smooth_with_power_iteration(x, y, n_power_iters);
    let l_smooth_max = glm_softplus_poisson_l_smooth_max(x, y);
    (l_smooth_max, l_smooth)
}

pub fn calculate_b_hat(num_samples: usize, l_smooth_max: f64, l_smooth: f64) -> f64 {
    let n = num_samples as f64;
    let numerator = n / 2.0 * (3.0 * l_smooth_max - l_smooth);
    let denominator = n * l_smooth - 3.0 * l_smooth_max;
    (numerator / denominator).sqrt()
}

pub fn calculate_b_tilde(num_samples: usize, l_smooth_max: f64, l_smooth: f64, strong_convexity: f64) -> f64 {
    let n = num_samples as f64;
    let numerator = n * (3.0 * l_smooth_max - l_smooth);
    let denominator = n * (n - 1.0) * strong_convexity - n * l_smooth + 3.0 * l_smooth_max;
    numerator / denominator
}

/// Theory-optimal mini-batch size, floored but otherwise unclamped, so
/// callers can detect NaN, infinite or sub-unit results.
pub fn calculate_optimal_batch_size_svrg_raw(
    num_samples: usize,
    l_smooth_max: f64,
    l_smooth: f64,
    strong_convexity: Option<f64>,
) -> f64 {
    let n = num_samples as f64;
    if l_smooth_max < n * l_smooth / 3.0 {
        let b_hat = calculate_b_hat(num_samples, l_smooth_max, l_smooth);
        let b = match strong_convexity {
            Some(mu) => {
                let b_tilde = calculate_b_tilde(num_samples, l_smooth_max, l_smooth, mu);
                if b_tilde > 0.0 {
                    b_hat.min(b_tilde)
                } else {
                    b_hat
                }
            }
            None => b_hat,
        };
        b.floor()
    } else {
        1.0
    }
}

pub fn calculate_optimal_batch_size_svrg(
    num_samples: usize,
    l_smooth_max: f64,
    l_smooth: f64,
    strong_convexity: Option<f64>,
) -> usize {
    let b = calculate_optimal_batch_size_svrg_raw(num_samples, l_smooth_max, l_smooth, strong_convexity);
    if b.is_finite() && b >= 1.0 {
        b as usize
    } else {
        1
    }
}

pub fn calculate_stepsize_svrg(batch_size: usize, num_samples: usize, l_smooth_max: f64, l_smooth: f64) -> f64 {
    let b = batch_size as f64;
    let n = num_samples as f64;
    let numerator = 0.5 * b * (n - 1.0);
    let denominator = 3.0 * (n - b) * l_smooth_max + n * (b - 1.0) * l_smooth;
    numerator / denominator
}

pub fn calculate_stepsize_saga(batch_size: usize, num_samples: usize, l_smooth_max: f64, l_smooth: f64) -> f64 {
    let b = batch_size as f64;
    let n = num_samples as f64;
    let numerator = 0.25 * b * (n - 1.0);
    let denominator = n * (b - 1.0) * l_smooth + (n - b) * l_smooth_max;
    numerator / denominator
}

/// Fill in whichever of `batch_size` and `stepsize` is missing from known
/// smoothness constants.
pub fn optimal_batch_and_stepsize_from_constants(
    num_samples: usize,
    l_smooth_max: f64,
    l_smooth: f64,
    batch_size: Option<usize>,
    stepsize: Option<f64>,
    strong_convexity: Option<f64>,
) -> SvrgDefaults {
    let batch_size = match batch_size {
        Some(b) => Some(b),
        None => {
            let b = calculate_optimal_batch_size_svrg_raw(num_samples, l_smooth_max, l_smooth, strong_convexity);
            if b.is_finite() && b >= 1.0 {
                Some(b as usize)
            } else {
                warn!(
                    "Could not determine batch size automatically. Batch size for SVRG will be set to 1."
                );
                None
            }
        }
    };

    let stepsize = match stepsize {
        Some(s) => Some(s),
        None => {
            let s = calculate_stepsize_svrg(batch_size.unwrap_or(1), num_samples, l_smooth_max, l_smooth);
            if s.is_finite() && s > 0.0 {
                Some(s)
            } else {
                warn!(
                    batch_size = batch_size.unwrap_or(1),
                    num_samples,
                    "Could not determine step size automatically. Falling back to line-search step size."
                );
                None
            }
        }
    };

    SvrgDefaults { batch_size, stepsize }
}

/// Compute SVRG defaults for the data `(x, y)` using `compute_smoothness`
/// to obtain `(L_max, L)`. Provided values are returned unchanged.
pub fn svrg_optimal_batch_and_stepsize<F>(
    compute_smoothness: F,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    batch_size: Option<usize>,
    stepsize: Option<f64>,
    strong_convexity: Option<f64>,
) -> SvrgDefaults
where
    F: Fn(ArrayView2<'_, f64>, ArrayView1<'_, f64>, usize) -> (f64, f64),
{
    if batch_size.is_some() && stepsize.is_some() {
        return SvrgDefaults { batch_size, stepsize };
    }
    let (l_smooth_max, l_smooth) = compute_smoothness(x, y, DEFAULT_POWER_ITERS);
    optimal_batch_and_stepsize_from_constants(
        x.nrows(),
        l_smooth_max,
        l_smooth,
        batch_size,
        stepsize,
        strong_convexity,
    )
}
