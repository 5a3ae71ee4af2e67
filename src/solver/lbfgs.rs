//! Limited-memory BFGS with Armijo backtracking.

use std::collections::VecDeque;

use crate::params::GlmParams;
use crate::solver::{Objective, OptStep, Solver, SolverAux, SolverKind, SolverOptions, SolverState};

/// Armijo sufficient-decrease constant.
const ARMIJO_C1: f64 = 1e-4;

/// Curvature pairs with `sᵀy` below this are skipped.
const CURVATURE_EPS: f64 = 1e-12;

pub struct Lbfgs {
    options: SolverOptions,
}

impl Lbfgs {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Two-loop recursion: approximates `-H⁻¹ g`.
    fn direction(grad: &GlmParams, s_history: &VecDeque<GlmParams>, y_history: &VecDeque<GlmParams>) -> GlmParams {
        let mut q = grad.clone();
        let mut alphas = Vec::with_capacity(s_history.len());

        for (s, y) in s_history.iter().zip(y_history.iter()).rev() {
            let rho = 1.0 / y.dot(s);
            let alpha = rho * s.dot(&q);
            q = q.axpy(-alpha, y);
            alphas.push((alpha, rho));
        }

        let gamma = match (s_history.back(), y_history.back()) {
            (Some(s), Some(y)) => s.dot(y) / y.dot(y),
            _ => 1.0,
        };
        let mut r = q.scale(gamma);

        for ((s, y), (alpha, rho)) in s_history.iter().zip(y_history.iter()).zip(alphas.into_iter().rev()) {
            let beta = rho * y.dot(&r);
            r = r.axpy(alpha - beta, s);
        }

        r.scale(-1.0)
    }
}

impl Solver for Lbfgs {
    fn kind(&self) -> SolverKind {
        SolverKind::Lbfgs
    }

    fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn init_state(&self, params: &GlmParams, objective: &dyn Objective) -> SolverState {
        let (value, grad) = objective.value_and_gradient(params);
        SolverState::new(
            value,
            self.options.stepsize.unwrap_or(1.0),
            SolverAux::Lbfgs {
                grad,
                s_history: VecDeque::with_capacity(self.options.history_size),
                y_history: VecDeque::with_capacity(self.options.history_size),
            },
        )
    }

    fn update(&self, params: &GlmParams, state: SolverState, objective: &dyn Objective) -> OptStep {
        let (grad, mut s_history, mut y_history) = match state.aux {
            SolverAux::Lbfgs {
                grad,
                s_history,
                y_history,
            } => (grad, s_history, y_history),
            _ => (objective.gradient(params), VecDeque::new(), VecDeque::new()),
        };

        let mut direction = Self::direction(&grad, &s_history, &y_history);
        let mut slope = direction.dot(&grad);
        if !(slope < 0.0) {
            // Not a descent direction; restart from steepest descent.
            s_history.clear();
            y_history.clear();
            direction = grad.scale(-1.0);
            slope = direction.dot(&grad);
        }

        let mut stepsize = self.options.stepsize.unwrap_or(1.0);
        let mut next = params.axpy(stepsize, &direction);
        let mut next_value = objective.value(&next);
        for _ in 0..self.options.maxls {
            if next_value.is_finite() && next_value <= state.value + ARMIJO_C1 * stepsize * slope {
                break;
            }
            stepsize *= self.options.decrease_factor;
            next = params.axpy(stepsize, &direction);
            next_value = objective.value(&next);
        }

        let next_grad = objective.gradient(&next);
        let s = next.sub(params);
        let y = next_grad.sub(&grad);
        if s.dot(&y) > CURVATURE_EPS {
            if s_history.len() == self.options.history_size {
                s_history.pop_front();
                y_history.pop_front();
            }
            s_history.push_back(s);
            y_history.push_back(y);
        }

        let error = next_grad.norm();

        OptStep {
            params: next,
            state: SolverState {
                iter_num: state.iter_num + 1,
                error,
                value: next_value,
                stepsize,
                aux: SolverAux::Lbfgs {
                    grad: next_grad,
                    s_history,
                    y_history,
                },
            },
        }
    }
}
