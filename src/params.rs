//! Model parameters and the small amount of vector algebra solvers need.

use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{GlmError, Result};

/// GLM parameters: one weight per feature plus a scalar intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmParams {
    pub coef: Array1<f64>,
    pub intercept: f64,
}

impl GlmParams {
    pub fn new(coef: Array1<f64>, intercept: f64) -> Self {
        Self { coef, intercept }
    }

    pub fn zeros(n_features: usize) -> Self {
        Self {
            coef: Array1::zeros(n_features),
            intercept: 0.0,
        }
    }

    pub fn n_features(&self) -> usize {
        self.coef.len()
    }

    /// Linear predictor `X w + b`.
    pub fn linear_predictor(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }

    /// `self + alpha * other`.
    pub fn axpy(&self, alpha: f64, other: &GlmParams) -> GlmParams {
        let mut coef = self.coef.clone();
        coef.scaled_add(alpha, &other.coef);
        GlmParams {
            coef,
            intercept: self.intercept + alpha * other.intercept,
        }
    }

    pub fn sub(&self, other: &GlmParams) -> GlmParams {
        self.axpy(-1.0, other)
    }

    pub fn scale(&self, alpha: f64) -> GlmParams {
        GlmParams {
            coef: &self.coef * alpha,
            intercept: self.intercept * alpha,
        }
    }

    pub fn dot(&self, other: &GlmParams) -> f64 {
        self.coef.dot(&other.coef) + self.intercept * other.intercept
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.intercept.is_finite() && self.coef.iter().all(|v| v.is_finite())
    }

    /// Number of non-zero coefficients (the intercept is not counted).
    pub fn count_nonzero_coef(&self) -> usize {
        self.coef.iter().filter(|v| **v != 0.0).count()
    }

    /// Validate these parameters against a design with `n_features` columns.
    pub fn check_consistency(&self, n_features: usize) -> Result<()> {
        if self.coef.len() != n_features {
            return Err(GlmError::ShapeMismatch(format!(
                "Inconsistent number of features. spike basis coefficients has {} features, \
                 X has {} features instead!",
                self.coef.len(),
                n_features
            )));
        }
        if !self.is_finite() {
            return Err(GlmError::NonFinite("initial parameters".into()));
        }
        Ok(())
    }
}

/// Largest absolute element-wise difference between two vectors.
pub fn max_abs_diff(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let mut out = 0.0_f64;
    Zip::from(a).and(b).for_each(|x, y| out = out.max((x - y).abs()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_axpy_and_norm() {
        let a = GlmParams::new(array![1.0, 2.0], 1.0);
        let b = GlmParams::new(array![1.0, 0.0], 2.0);
        let c = a.axpy(2.0, &b);
        assert_eq!(c.coef, array![3.0, 2.0]);
        assert_eq!(c.intercept, 5.0);
        assert!((GlmParams::new(array![3.0], 4.0).norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_consistency_rejects_wrong_width() {
        let p = GlmParams::zeros(3);
        assert!(p.check_consistency(3).is_ok());
        assert!(matches!(p.check_consistency(2), Err(GlmError::ShapeMismatch(_))));
    }
}
