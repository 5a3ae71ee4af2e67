//! Raised-cosine basis functions and spike-history design matrices.
//!
//! A basis turns a window of past activity into a handful of smooth
//! features. The log-stretched variant packs narrow bumps near lag zero and
//! wide bumps at long lags, matching the fast-then-slow shape of typical
//! spike-history filters.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{GlmError, Result};

/// Raised cosines with peaks equally spaced on `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaisedCosineLinear {
    pub n_basis_funcs: usize,
    pub width: f64,
}

/// Raised cosines equally spaced after a log warping of the samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaisedCosineLog {
    pub n_basis_funcs: usize,
    pub width: f64,
    pub time_scaling: f64,
}

fn check_basis_args(n_basis_funcs: usize, width: f64) -> Result<()> {
    if n_basis_funcs < 2 {
        return Err(GlmError::invalid_value(
            "n_basis_funcs",
            format!("raised cosine bases need at least 2 functions, got {n_basis_funcs}"),
        ));
    }
    let twice = 2.0 * width;
    if !(width > 1.0) || (twice - twice.round()).abs() > 1e-12 {
        return Err(GlmError::invalid_value(
            "width",
            format!("width must be greater than 1 and 2*width must be an integer, got {width}"),
        ));
    }
    Ok(())
}

fn check_samples(samples: ArrayView1<'_, f64>) -> Result<()> {
    if samples.iter().any(|s| !(0.0..=1.0).contains(s)) {
        return Err(GlmError::invalid_value("samples", "sample points must lie in [0, 1]"));
    }
    Ok(())
}

/// Bumps `½(cos(clip(π(x - p_i)/(Δ·width), -π, π)) + 1)` for already
/// warped samples `x`.
fn raised_cosine(warped: ArrayView1<'_, f64>, n_basis_funcs: usize, width: f64) -> Array2<f64> {
    let delta = 1.0 / (n_basis_funcs - 1) as f64;
    let pi = std::f64::consts::PI;
    Array2::from_shape_fn((warped.len(), n_basis_funcs), |(t, i)| {
        let peak = i as f64 * delta;
        let arg = (pi * (warped[t] - peak) / (delta * width)).clamp(-pi, pi);
        0.5 * (arg.cos() + 1.0)
    })
}

impl RaisedCosineLinear {
    pub fn new(n_basis_funcs: usize) -> Result<Self> {
        Self::with_width(n_basis_funcs, 2.0)
    }

    pub fn with_width(n_basis_funcs: usize, width: f64) -> Result<Self> {
        check_basis_args(n_basis_funcs, width)?;
        Ok(Self { n_basis_funcs, width })
    }

    /// Evaluate every basis function at each sample in `[0, 1]`.
    pub fn evaluate(&self, samples: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
        check_samples(samples)?;
        Ok(raised_cosine(samples, self.n_basis_funcs, self.width))
    }

    /// Evaluate on `n_samples` equally spaced points of `[0, 1]`.
    pub fn evaluate_on_grid(&self, n_samples: usize) -> Result<(Array1<f64>, Array2<f64>)> {
        let grid = Array1::linspace(0.0, 1.0, n_samples);
        let values = self.evaluate(grid.view())?;
        Ok((grid, values))
    }
}

impl RaisedCosineLog {
    pub fn new(n_basis_funcs: usize) -> Result<Self> {
        Self::with_params(n_basis_funcs, 2.0, 50.0)
    }

    pub fn with_params(n_basis_funcs: usize, width: f64, time_scaling: f64) -> Result<Self> {
        check_basis_args(n_basis_funcs, width)?;
        if !(time_scaling > 0.0) {
            return Err(GlmError::invalid_value("time_scaling", "must be positive"));
        }
        Ok(Self {
            n_basis_funcs,
            width,
            time_scaling,
        })
    }

    fn warp(&self, x: f64) -> f64 {
        (self.time_scaling * x).ln_1p() / self.time_scaling.ln_1p()
    }

    pub fn evaluate(&self, samples: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
        check_samples(samples)?;
        let warped = samples.mapv(|x| self.warp(x));
        Ok(raised_cosine(warped.view(), self.n_basis_funcs, self.width))
    }

    pub fn evaluate_on_grid(&self, n_samples: usize) -> Result<(Array1<f64>, Array2<f64>)> {
        let grid = Array1::linspace(0.0, 1.0, n_samples);
        let values = self.evaluate(grid.view())?;
        Ok((grid, values))
    }
}

/// Causal spike-history features.
///
/// `counts` is `T × N` (time × neurons) and `basis` is `W × K` where row `j`
/// weights lag `j + 1`. The output is `T × N·K`, with column `n·K + k` the
/// activity of neuron `n` filtered by basis function `k`. The first `W` rows
/// lack a full history window and are NaN, so `Glm::fit` drops them.
pub fn history_design(counts: ArrayView2<'_, f64>, basis: ArrayView2<'_, f64>) -> Array2<f64> {
    let (n_time, n_neurons) = counts.dim();
    let (window, n_basis) = basis.dim();
    let mut out = Array2::from_elem((n_time, n_neurons * n_basis), f64::NAN);

    for t in window..n_time {
        for n in 0..n_neurons {
            for k in 0..n_basis {
                let mut acc = 0.0;
                for lag in 0..window {
                    acc += counts[[t - 1 - lag, n]] * basis[[lag, k]];
                }
                out[[t, n * n_basis + k]] = acc;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_basis_partition_of_unity() {
        let basis = RaisedCosineLinear::new(5).unwrap();
        let (_, values) = basis.evaluate_on_grid(101).unwrap();
        assert_eq!(values.dim(), (101, 5));
        for row in values.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_log_basis_peaks_are_ordered() {
        let basis = RaisedCosineLog::new(4).unwrap();
        let (_, values) = basis.evaluate_on_grid(200).unwrap();
        let peaks: Vec<usize> = (0..4)
            .map(|k| {
                let col = values.column(k);
                (0..col.len()).fold(0, |best, i| if col[i] > col[best] { i } else { best })
            })
            .collect();
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(peaks[0], 0);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(RaisedCosineLinear::new(1).is_err());
        assert!(RaisedCosineLinear::with_width(3, 1.0).is_err());
        assert!(RaisedCosineLinear::with_width(3, 1.3).is_err());
        assert!(RaisedCosineLinear::with_width(3, 1.5).is_ok());
        let basis = RaisedCosineLinear::new(3).unwrap();
        assert!(basis.evaluate(array![0.5, 1.2].view()).is_err());
    }

    #[test]
    fn test_history_design_is_causal() {
        let counts = array![[1.0], [0.0], [2.0], [0.0], [1.0]];
        let basis = array![[1.0, 0.0], [0.0, 1.0]];
        let design = history_design(counts.view(), basis.view());
        assert_eq!(design.dim(), (5, 2));
        assert!(design[[0, 0]].is_nan() && design[[1, 1]].is_nan());
        // t = 2: lag 1 -> counts[1], lag 2 -> counts[0]
        assert_eq!(design[[2, 0]], 0.0);
        assert_eq!(design[[2, 1]], 1.0);
        // t = 4: lag 1 -> counts[3], lag 2 -> counts[2]
        assert_eq!(design[[4, 0]], 0.0);
        assert_eq!(design[[4, 1]], 2.0);
    }
}
