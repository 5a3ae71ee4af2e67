//! Regularization schemes for GLM fitting.
//!
//! Each regularizer knows which solvers can optimise it, its penalty term,
//! and its proximal operator. The intercept is never penalized.
//!
//! - [`prox`]: the proximal operators themselves

pub mod prox;

use std::fmt;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{GlmError, Result};
use crate::estimator::{unknown_param, ParamMap, ParamValue, Params};
use crate::params::GlmParams;
use crate::solver::SolverKind;

const DEFAULT_STRENGTH: f64 = 1.0;

/// Penalty applied to the coefficients during optimisation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Regularizer {
    #[default]
    Unregularized,
    Ridge {
        regularizer_strength: f64,
    },
    Lasso {
        regularizer_strength: f64,
    },
    GroupLasso {
        regularizer_strength: f64,
        /// `n_groups × n_features` membership mask of zeros and ones.
        mask: Array2<f64>,
    },
}

/// Instantiate a regularizer from its name with the default strength.
pub fn create_regularizer(name: &str) -> Result<Regularizer> {
    match name {
        "unregularized" => Ok(Regularizer::Unregularized),
        "ridge" => Ok(Regularizer::ridge(DEFAULT_STRENGTH)),
        "lasso" => Ok(Regularizer::lasso(DEFAULT_STRENGTH)),
        "group_lasso" => Err(GlmError::invalid_value(
            "regularizer",
            "group_lasso needs a group mask; construct it with Regularizer::group_lasso",
        )),
        other => Err(GlmError::UnknownRegularizer(other.to_string())),
    }
}

impl Regularizer {
    pub fn ridge(regularizer_strength: f64) -> Self {
        Regularizer::Ridge { regularizer_strength }
    }

    pub fn lasso(regularizer_strength: f64) -> Self {
        Regularizer::Lasso { regularizer_strength }
    }

    /// Group lasso over the groups encoded by `mask`; the mask is validated.
    pub fn group_lasso(regularizer_strength: f64, mask: Array2<f64>) -> Result<Self> {
        validate_mask(&mask)?;
        Ok(Regularizer::GroupLasso {
            regularizer_strength,
            mask,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Regularizer::Unregularized => "unregularized",
            Regularizer::Ridge { .. } => "ridge",
            Regularizer::Lasso { .. } => "lasso",
            Regularizer::GroupLasso { .. } => "group_lasso",
        }
    }

    pub fn strength(&self) -> Option<f64> {
        match self {
            Regularizer::Unregularized => None,
            Regularizer::Ridge { regularizer_strength }
            | Regularizer::Lasso { regularizer_strength }
            | Regularizer::GroupLasso {
                regularizer_strength,
                ..
            } => Some(*regularizer_strength),
        }
    }

    pub fn allowed_solvers(&self) -> &'static [SolverKind] {
        use SolverKind::*;
        match self {
            Regularizer::Unregularized | Regularizer::Ridge { .. } => {
                &[GradientDescent, ProximalGradient, Lbfgs, Svrg, ProxSvrg]
            }
            Regularizer::Lasso { .. } | Regularizer::GroupLasso { .. } => &[ProximalGradient, ProxSvrg],
        }
    }

    pub fn default_solver(&self) -> SolverKind {
        match self {
            Regularizer::Unregularized | Regularizer::Ridge { .. } => SolverKind::GradientDescent,
            Regularizer::Lasso { .. } | Regularizer::GroupLasso { .. } => SolverKind::ProximalGradient,
        }
    }

    pub fn allows(&self, solver: SolverKind) -> bool {
        self.allowed_solvers().contains(&solver)
    }

    /// Fail with `SolverNotAllowed` unless `solver` can optimise this penalty.
    pub fn check_solver(&self, solver: SolverKind) -> Result<()> {
        if self.allows(solver) {
            return Ok(());
        }
        Err(GlmError::SolverNotAllowed {
            solver: solver.to_string(),
            regularizer: self.name().to_string(),
            allowed: self.allowed_solvers().iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Penalty value for the given coefficients.
    pub fn penalty(&self, coef: ArrayView1<'_, f64>) -> f64 {
        match self {
            Regularizer::Unregularized => 0.0,
            Regularizer::Ridge { regularizer_strength } => {
                0.5 * regularizer_strength * coef.dot(&coef)
            }
            Regularizer::Lasso { regularizer_strength } => {
                regularizer_strength * coef.iter().map(|w| w.abs()).sum::<f64>()
            }
            Regularizer::GroupLasso {
                regularizer_strength,
                mask,
            } => {
                let mut total = 0.0;
                for group in mask.rows() {
                    let size = group.iter().filter(|m| **m != 0.0).count() as f64;
                    let sq: f64 = group
                        .iter()
                        .zip(coef.iter())
                        .filter(|(m, _)| **m != 0.0)
                        .map(|(_, w)| w * w)
                        .sum();
                    total += size.sqrt() * sq.sqrt();
                }
                regularizer_strength * total
            }
        }
    }

    /// `loss(params) + penalty(params.coef)`.
    pub fn penalized_loss<'a, F>(&'a self, loss: F) -> impl Fn(&GlmParams) -> f64 + 'a
    where
        F: Fn(&GlmParams) -> f64 + 'a,
    {
        move |params: &GlmParams| loss(params) + self.penalty(params.coef.view())
    }

    /// Strength of the quadratic penalty to fold into a smooth objective
    /// when `solver` does not apply a proximal step.
    pub fn smooth_penalty_for(&self, solver: SolverKind) -> Option<f64> {
        match self {
            Regularizer::Ridge { regularizer_strength } if !solver.is_proximal() => {
                Some(*regularizer_strength)
            }
            _ => None,
        }
    }

    /// Proximal operator to pair with `solver`.
    pub fn proximal_operator(&self, solver: SolverKind) -> prox::ProxOperator {
        if !solver.is_proximal() {
            return prox::ProxOperator::Identity;
        }
        match self {
            Regularizer::Unregularized => prox::ProxOperator::Identity,
            Regularizer::Ridge { regularizer_strength } => prox::ProxOperator::Ridge(*regularizer_strength),
            Regularizer::Lasso { regularizer_strength } => prox::ProxOperator::Lasso(*regularizer_strength),
            Regularizer::GroupLasso {
                regularizer_strength,
                mask,
            } => prox::ProxOperator::GroupLasso {
                strength: *regularizer_strength,
                mask: mask.clone(),
            },
        }
    }

    /// Re-check invariants of a regularizer that did not come through a
    /// constructor, e.g. one read from a config or model file.
    pub fn validate(&self) -> Result<()> {
        if let Some(strength) = self.strength() {
            if !(strength >= 0.0) {
                return Err(GlmError::invalid_value("regularizer_strength", "must be non-negative"));
            }
        }
        if let Regularizer::GroupLasso { mask, .. } = self {
            validate_mask(mask)?;
        }
        Ok(())
    }

    /// Group lasso masks must match the design width.
    pub fn check_n_features(&self, n_features: usize) -> Result<()> {
        if let Regularizer::GroupLasso { mask, .. } = self {
            if mask.ncols() != n_features {
                return Err(GlmError::ShapeMismatch(format!(
                    "group mask has {} features, X has {} features",
                    mask.ncols(),
                    n_features
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Regularizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn validate_mask(mask: &Array2<f64>) -> Result<()> {
    if mask.nrows() == 0 || mask.ncols() == 0 {
        return Err(GlmError::invalid_value("mask", "mask must have at least one group and one feature"));
    }
    if mask.iter().any(|m| *m != 0.0 && *m != 1.0) {
        return Err(GlmError::invalid_value("mask", "mask entries must be 0 or 1"));
    }
    for (g, group) in mask.rows().into_iter().enumerate() {
        if group.sum() == 0.0 {
            return Err(GlmError::invalid_value("mask", format!("group {g} is empty")));
        }
    }
    for (j, column) in mask.columns().into_iter().enumerate() {
        if column.sum() > 1.0 {
            return Err(GlmError::invalid_value(
                "mask",
                format!("feature {j} belongs to more than one group"),
            ));
        }
    }
    Ok(())
}

impl Params for Regularizer {
    fn own_params(&self) -> ParamMap {
        let mut out = ParamMap::new();
        if let Some(strength) = self.strength() {
            out.insert("regularizer_strength".into(), strength.into());
        }
        out
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match (name, self) {
            (
                "regularizer_strength",
                Regularizer::Ridge { regularizer_strength }
                | Regularizer::Lasso { regularizer_strength }
                | Regularizer::GroupLasso {
                    regularizer_strength,
                    ..
                },
            ) => {
                let v = value.as_f64(name)?;
                if !(v >= 0.0) {
                    return Err(GlmError::invalid_value(name, "must be non-negative"));
                }
                *regularizer_strength = v;
                Ok(())
            }
            (other, this) => Err(unknown_param(&*this, other)),
        }
    }
}
