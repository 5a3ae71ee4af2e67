//! Input validation shared by fitting, scoring and simulation.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use tracing::debug;

use crate::error::{GlmError, Result};

/// Fail unless `x` has as many rows as `y` has entries.
pub fn check_n_timepoints(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(GlmError::ShapeMismatch(format!(
            "The number of time-points in X and y must agree. X has {} time-points, y has {} instead!",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

pub fn check_n_features(x: ArrayView2<'_, f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(GlmError::ShapeMismatch(format!(
            "Inconsistent number of features. Model has {} features, X has {} features instead!",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

/// Mask of samples whose `x` row and `y` entry are all finite.
pub fn valid_samples(x: ArrayView2<'_, f64>, y: Option<ArrayView1<'_, f64>>) -> Array1<bool> {
    let mut mask: Array1<bool> = x.rows().into_iter().map(|row| row.iter().all(|v| v.is_finite())).collect();
    if let Some(y) = y {
        Zip::from(&mut mask).and(y).for_each(|m, v| *m = *m && v.is_finite());
    }
    mask
}

/// Error if no sample is fully finite.
pub fn error_all_invalid(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if valid_samples(x, Some(y)).iter().any(|v| *v) {
        Ok(())
    } else {
        Err(GlmError::AllInvalid)
    }
}

/// Keep only the fully finite samples of `(x, y)`.
pub fn drop_invalid(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let mask = valid_samples(x, Some(y));
    let keep: Vec<usize> = mask.iter().enumerate().filter(|(_, v)| **v).map(|(i, _)| i).collect();
    if keep.is_empty() {
        return Err(GlmError::AllInvalid);
    }
    if keep.len() < mask.len() {
        debug!(dropped = mask.len() - keep.len(), kept = keep.len(), "Dropping non-finite samples");
    }
    let x = x.select(Axis(0), &keep);
    let y = keep.iter().map(|&i| y[i]).collect();
    Ok((x, y))
}

/// Counts must be non-negative wherever they are finite.
pub fn check_counts(y: ArrayView1<'_, f64>) -> Result<()> {
    if y.iter().any(|v| v.is_finite() && *v < 0.0) {
        return Err(GlmError::invalid_value("y", "spike counts must be non-negative"));
    }
    Ok(())
}
