//! Proximal operators.
//!
//! `prox(w, s) = argmin_z ½||z - w||² + s·penalty(z)`, applied to the
//! coefficients only; the intercept passes through unchanged.

use ndarray::{Array1, Array2};

use crate::params::GlmParams;

#[derive(Debug, Clone, PartialEq)]
pub enum ProxOperator {
    Identity,
    Ridge(f64),
    Lasso(f64),
    GroupLasso { strength: f64, mask: Array2<f64> },
}

impl ProxOperator {
    pub fn apply(&self, params: &GlmParams, stepsize: f64) -> GlmParams {
        let coef = match self {
            ProxOperator::Identity => return params.clone(),
            ProxOperator::Ridge(strength) => prox_ridge(&params.coef, strength * stepsize),
            ProxOperator::Lasso(strength) => prox_lasso(&params.coef, strength * stepsize),
            ProxOperator::GroupLasso { strength, mask } => {
                prox_group_lasso(&params.coef, mask, strength * stepsize)
            }
        };
        GlmParams::new(coef, params.intercept)
    }
}

/// Shrinkage `w / (1 + t)`.
pub fn prox_ridge(coef: &Array1<f64>, threshold: f64) -> Array1<f64> {
    coef / (1.0 + threshold)
}

/// Soft-thresholding `sign(w) max(|w| - t, 0)`.
pub fn prox_lasso(coef: &Array1<f64>, threshold: f64) -> Array1<f64> {
    coef.mapv(|w| w.signum() * (w.abs() - threshold).max(0.0))
}

/// Block soft-thresholding, one block per mask row, scaled by `sqrt(|g|)`.
/// Features outside every group are left untouched.
pub fn prox_group_lasso(coef: &Array1<f64>, mask: &Array2<f64>, threshold: f64) -> Array1<f64> {
    let mut out = coef.clone();
    for group in mask.rows() {
        let members: Vec<usize> = group
            .iter()
            .enumerate()
            .filter(|(_, m)| **m != 0.0)
            .map(|(j, _)| j)
            .collect();
        let norm = members.iter().map(|&j| coef[j] * coef[j]).sum::<f64>().sqrt();
        let scaled = threshold * (members.len() as f64).sqrt();
        let factor = if norm > 0.0 { (1.0 - scaled / norm).max(0.0) } else { 0.0 };
        for j in members {
            out[j] = coef[j] * factor;
        }
    }
    out
}
