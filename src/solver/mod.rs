//! Iterative solvers for GLM objectives.
//!
//! Every solver exposes the same three entry points: `init_state` prepares
//! the optimiser state, `update` performs one step, and `run` iterates
//! `update` until the error drops below `tol` or `maxiter` is reached.
//!
//! - [`objective`]: the GLM loss and its gradients
//! - [`proximal`]: gradient descent and (accelerated) proximal gradient
//! - [`lbfgs`]: limited-memory BFGS
//! - [`svrg`]: stochastic variance-reduced gradient (plain and proximal)
//! - [`svrg_defaults`]: automatic batch size and step size for SVRG

pub mod lbfgs;
pub mod objective;
pub mod proximal;
pub mod svrg;
pub mod svrg_defaults;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GlmError, Result};
use crate::estimator::{ParamMap, ParamValue, Params};
use crate::params::GlmParams;
use crate::regularizer::prox::ProxOperator;

pub use objective::{GlmObjective, Objective};

/// Available optimisation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverKind {
    GradientDescent,
    ProximalGradient,
    #[serde(rename = "LBFGS")]
    Lbfgs,
    #[serde(rename = "SVRG")]
    Svrg,
    #[serde(rename = "ProxSVRG")]
    ProxSvrg,
}

impl SolverKind {
    pub fn name(self) -> &'static str {
        match self {
            SolverKind::GradientDescent => "GradientDescent",
            SolverKind::ProximalGradient => "ProximalGradient",
            SolverKind::Lbfgs => "LBFGS",
            SolverKind::Svrg => "SVRG",
            SolverKind::ProxSvrg => "ProxSVRG",
        }
    }

    /// Whether the solver takes a proximal step after each gradient step.
    pub fn is_proximal(self) -> bool {
        matches!(self, SolverKind::ProximalGradient | SolverKind::ProxSvrg)
    }

    pub fn is_stochastic(self) -> bool {
        matches!(self, SolverKind::Svrg | SolverKind::ProxSvrg)
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverKind {
    type Err = GlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GradientDescent" => Ok(SolverKind::GradientDescent),
            "ProximalGradient" => Ok(SolverKind::ProximalGradient),
            "LBFGS" => Ok(SolverKind::Lbfgs),
            "SVRG" => Ok(SolverKind::Svrg),
            "ProxSVRG" => Ok(SolverKind::ProxSvrg),
            other => Err(GlmError::UnknownSolver(other.to_string())),
        }
    }
}

/// Tuning knobs shared by all solvers. Options a solver does not use are
/// ignored by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    /// Maximum number of `update` calls in `run`.
    pub maxiter: usize,

    /// Stop once the solver error falls below this value.
    pub tol: f64,

    /// Fixed step size; `None` selects line search (or automatic SVRG
    /// defaults).
    pub stepsize: Option<f64>,

    /// Nesterov/FISTA momentum for the gradient solvers.
    pub acceleration: bool,

    /// Backtracking shrink factor.
    pub decrease_factor: f64,

    /// Maximum backtracking steps per iteration.
    pub maxls: usize,

    /// Curvature pairs kept by L-BFGS.
    pub history_size: usize,

    /// Mini-batch size for SVRG; `None` computes it automatically.
    pub batch_size: Option<usize>,

    /// Strong convexity constant used to pick the SVRG batch size.
    pub strong_convexity: Option<f64>,

    /// Seed for mini-batch sampling.
    pub seed: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            maxiter: 1000,
            tol: 1e-6,
            stepsize: None,
            acceleration: true,
            decrease_factor: 0.5,
            maxls: 30,
            history_size: 10,
            batch_size: None,
            strong_convexity: None,
            seed: 0,
        }
    }
}

impl SolverOptions {
    /// Parse options from a JSON object, rejecting unknown keys.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| GlmError::UnknownSolverOption(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tol > 0.0) {
            return Err(GlmError::invalid_value("tol", "must be positive"));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(GlmError::invalid_value("decrease_factor", "must lie in (0, 1)"));
        }
        if let Some(s) = self.stepsize {
            if !(s > 0.0) || !s.is_finite() {
                return Err(GlmError::invalid_value("stepsize", "must be positive and finite"));
            }
        }
        if self.batch_size == Some(0) {
            return Err(GlmError::invalid_value("batch_size", "must be at least 1"));
        }
        if self.history_size == 0 {
            return Err(GlmError::invalid_value("history_size", "must be at least 1"));
        }
        Ok(())
    }
}

impl Params for SolverOptions {
    fn own_params(&self) -> ParamMap {
        let mut out = ParamMap::new();
        out.insert("maxiter".into(), self.maxiter.into());
        out.insert("tol".into(), self.tol.into());
        out.insert("stepsize".into(), self.stepsize.into());
        out.insert("acceleration".into(), self.acceleration.into());
        out.insert("decrease_factor".into(), self.decrease_factor.into());
        out.insert("maxls".into(), self.maxls.into());
        out.insert("history_size".into(), self.history_size.into());
        out.insert("batch_size".into(), self.batch_size.into());
        out.insert("strong_convexity".into(), self.strong_convexity.into());
        out.insert("seed".into(), self.seed.into());
        out
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let mut next = self.clone();
        match name {
            "maxiter" => next.maxiter = value.as_usize(name)?,
            "tol" => next.tol = value.as_f64(name)?,
            "stepsize" => next.stepsize = value.as_opt_f64(name)?,
            "acceleration" => next.acceleration = value.as_bool(name)?,
            "decrease_factor" => next.decrease_factor = value.as_f64(name)?,
            "maxls" => next.maxls = value.as_usize(name)?,
            "history_size" => next.history_size = value.as_usize(name)?,
            "batch_size" => next.batch_size = value.as_opt_usize(name)?,
            "strong_convexity" => next.strong_convexity = value.as_opt_f64(name)?,
            "seed" => next.seed = value.as_usize(name)? as u64,
            other => return Err(GlmError::UnknownSolverOption(other.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Solver-specific auxiliary state.
#[derive(Debug, Clone)]
pub enum SolverAux {
    None,
    /// Extrapolated point and momentum scalar of FISTA.
    Fista { extrapolated: GlmParams, t: f64 },
    /// Gradient at the current point and curvature history.
    Lbfgs {
        grad: GlmParams,
        s_history: VecDeque<GlmParams>,
        y_history: VecDeque<GlmParams>,
    },
    /// Mini-batch sampler.
    Svrg { rng: StdRng, batch_size: usize },
}

/// Optimiser state carried between `update` calls.
#[derive(Debug, Clone)]
pub struct SolverState {
    pub iter_num: usize,
    pub error: f64,
    /// Objective value at the latest iterate (smooth part only).
    pub value: f64,
    pub stepsize: f64,
    pub aux: SolverAux,
}

impl SolverState {
    pub(crate) fn new(value: f64, stepsize: f64, aux: SolverAux) -> Self {
        Self {
            iter_num: 0,
            error: f64::INFINITY,
            value,
            stepsize,
            aux,
        }
    }

    pub fn converged(&self, tol: f64) -> bool {
        self.error < tol
    }

    /// Fail if the carried iterates were built for a different number of
    /// features.
    pub fn check_n_features(&self, n_features: usize) -> Result<()> {
        let widths: Vec<usize> = match &self.aux {
            SolverAux::Fista { extrapolated, .. } => vec![extrapolated.n_features()],
            SolverAux::Lbfgs {
                grad,
                s_history,
                y_history,
            } => std::iter::once(grad)
                .chain(s_history)
                .chain(y_history)
                .map(GlmParams::n_features)
                .collect(),
            SolverAux::None | SolverAux::Svrg { .. } => Vec::new(),
        };
        match widths.into_iter().find(|&w| w != n_features) {
            Some(w) => Err(GlmError::ShapeMismatch(format!(
                "Solver state holds {w} features, X has {n_features} features instead!"
            ))),
            None => Ok(()),
        }
    }
}

/// Result of a solver step or run.
#[derive(Debug, Clone)]
pub struct OptStep {
    pub params: GlmParams,
    pub state: SolverState,
}

pub trait Solver: Send + Sync {
    fn kind(&self) -> SolverKind;

    fn options(&self) -> &SolverOptions;

    fn init_state(&self, params: &GlmParams, objective: &dyn Objective) -> SolverState;

    fn update(&self, params: &GlmParams, state: SolverState, objective: &dyn Objective) -> OptStep;

    fn run(&self, init: GlmParams, objective: &dyn Objective) -> OptStep {
        let opts = self.options();
        let mut state = self.init_state(&init, objective);
        let mut params = init;

        while state.iter_num < opts.maxiter && !state.converged(opts.tol) {
            let step = self.update(&params, state, objective);
            params = step.params;
            state = step.state;
        }

        debug!(
            solver = %self.kind(),
            iterations = state.iter_num,
            error = state.error,
            value = state.value,
            converged = state.converged(opts.tol),
            "Solver finished"
        );

        OptStep { params, state }
    }
}

/// Build a solver of the given kind. `prox` is ignored by solvers that do
/// not take proximal steps.
pub fn instantiate_solver(kind: SolverKind, options: SolverOptions, prox: ProxOperator) -> Result<Box<dyn Solver>> {
    options.validate()?;
    let solver: Box<dyn Solver> = match kind {
        SolverKind::GradientDescent => Box::new(proximal::ProximalGradient::gradient_descent(options)),
        SolverKind::ProximalGradient => Box::new(proximal::ProximalGradient::new(options, prox)),
        SolverKind::Lbfgs => Box::new(lbfgs::Lbfgs::new(options)),
        SolverKind::Svrg => Box::new(svrg::Svrg::new(options, ProxOperator::Identity, SolverKind::Svrg)),
        SolverKind::ProxSvrg => Box::new(svrg::Svrg::new(options, prox, SolverKind::ProxSvrg)),
    };
    Ok(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_solver_names_roundtrip() {
        for kind in [
            SolverKind::GradientDescent,
            SolverKind::ProximalGradient,
            SolverKind::Lbfgs,
            SolverKind::Svrg,
            SolverKind::ProxSvrg,
        ] {
            assert_eq!(kind.name().parse::<SolverKind>().unwrap(), kind);
        }
        assert!(matches!("BFGS".parse::<SolverKind>(), Err(GlmError::UnknownSolver(_))));
    }

    #[test]
    fn test_options_reject_unknown_keys() {
        let ok = SolverOptions::from_json(json!({"maxiter": 50, "tol": 1e-4})).unwrap();
        assert_eq!(ok.maxiter, 50);
        assert!(ok.acceleration);
        assert!(matches!(
            SolverOptions::from_json(json!({"not_an_arg": 1})),
            Err(GlmError::UnknownSolverOption(_))
        ));
    }

    #[test]
    fn test_options_set_params() {
        let mut opts = SolverOptions::default();
        opts.set_params([("stepsize", ParamValue::Float(0.1)), ("maxiter", ParamValue::Int(10))])
            .unwrap();
        assert_eq!(opts.stepsize, Some(0.1));
        assert_eq!(opts.maxiter, 10);
        assert!(opts.set_param("stepsize", ParamValue::Float(-1.0)).is_err());
        assert!(matches!(
            opts.set_param("verbose", ParamValue::Bool(true)),
            Err(GlmError::InvalidParameter { .. }) | Err(GlmError::UnknownSolverOption(_))
        ));
    }
}
