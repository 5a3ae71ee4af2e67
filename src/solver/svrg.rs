//! Stochastic variance-reduced gradient, with an optional proximal step.
//!
//! One `update` is one epoch: the full gradient is computed at the anchor
//! (the current iterate), then `n / batch_size` mini-batch steps are taken
//! with the variance-reduced estimate
//!
//! ```text
//! v = ∇f_B(x) - ∇f_B(x̃) + ∇f(x̃)
//! ```
//!
//! followed by the proximal operator. The error is `||x_epoch - x̃|| / s`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::params::GlmParams;
use crate::regularizer::prox::ProxOperator;
use crate::solver::svrg_defaults::optimal_batch_and_stepsize_from_constants;
use crate::solver::{Objective, OptStep, Solver, SolverAux, SolverKind, SolverOptions, SolverState};

/// Safety factor applied to a line-search step size when no smoothness
/// constants are available.
const FALLBACK_STEP_FACTOR: f64 = 0.5;

pub struct Svrg {
    options: SolverOptions,
    prox: ProxOperator,
    kind: SolverKind,
}

impl Svrg {
    pub fn new(options: SolverOptions, prox: ProxOperator, kind: SolverKind) -> Self {
        Self { options, prox, kind }
    }

    /// Batch size and step size: user options first, then theory-driven
    /// defaults, then a backtracking estimate at the initial point.
    fn resolve_hyperparameters(&self, params: &GlmParams, objective: &dyn Objective) -> (usize, f64) {
        let n = objective.n_samples().max(1);
        let mut batch_size = self.options.batch_size;
        let mut stepsize = self.options.stepsize;

        if batch_size.is_none() || stepsize.is_none() {
            if let Some((l_smooth_max, l_smooth)) = objective.smoothness_constants() {
                let defaults = optimal_batch_and_stepsize_from_constants(
                    n,
                    l_smooth_max,
                    l_smooth,
                    batch_size,
                    stepsize,
                    self.options.strong_convexity,
                );
                batch_size = defaults.batch_size;
                stepsize = defaults.stepsize;
            }
        }

        let batch_size = batch_size.unwrap_or(1).clamp(1, n);
        let stepsize = match stepsize {
            Some(s) => s,
            None => {
                let s = self.backtracking_estimate(params, objective) * FALLBACK_STEP_FACTOR;
                info!(stepsize = s, "Using line-search estimate as SVRG step size");
                s
            }
        };
        (batch_size, stepsize)
    }

    fn backtracking_estimate(&self, params: &GlmParams, objective: &dyn Objective) -> f64 {
        let (value, grad) = objective.value_and_gradient(params);
        let grad_sq = grad.dot(&grad);
        let mut s = 1.0;
        for _ in 0..self.options.maxls {
            let candidate = objective.value(&params.axpy(-s, &grad));
            if candidate.is_finite() && candidate <= value - 0.5 * s * grad_sq {
                break;
            }
            s *= self.options.decrease_factor;
        }
        s
    }
}

impl Solver for Svrg {
    fn kind(&self) -> SolverKind {
        self.kind
    }

    fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn init_state(&self, params: &GlmParams, objective: &dyn Objective) -> SolverState {
        let (batch_size, stepsize) = self.resolve_hyperparameters(params, objective);
        debug!(batch_size, stepsize, solver = %self.kind, "SVRG hyperparameters");
        SolverState::new(
            objective.value(params),
            stepsize,
            SolverAux::Svrg {
                rng: StdRng::seed_from_u64(self.options.seed),
                batch_size,
            },
        )
    }

    fn update(&self, params: &GlmParams, state: SolverState, objective: &dyn Objective) -> OptStep {
        let n = objective.n_samples().max(1);
        let (mut rng, batch_size) = match state.aux {
            SolverAux::Svrg { rng, batch_size } => (rng, batch_size),
            _ => (StdRng::seed_from_u64(self.options.seed), 1),
        };
        let stepsize = state.stepsize;

        let anchor = params;
        let full_grad = objective.gradient(anchor);
        let inner_steps = (n / batch_size).max(1);

        let mut x = anchor.clone();
        let mut rows = vec![0usize; batch_size];
        for _ in 0..inner_steps {
            for r in rows.iter_mut() {
                *r = rng.gen_range(0..n);
            }
            let g_x = objective.batch_gradient(&x, &rows);
            let g_anchor = objective.batch_gradient(anchor, &rows);
            let v = g_x.sub(&g_anchor).axpy(1.0, &full_grad);
            x = self.prox.apply(&x.axpy(-stepsize, &v), stepsize);
        }

        let error = x.sub(anchor).norm() / stepsize;
        let value = objective.value(&x);

        OptStep {
            params: x,
            state: SolverState {
                iter_num: state.iter_num + 1,
                error,
                value,
                stepsize,
                aux: SolverAux::Svrg { rng, batch_size },
            },
        }
    }
}
