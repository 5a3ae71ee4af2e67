//! Gradient descent and proximal gradient (ISTA / FISTA).
//!
//! Gradient descent is proximal gradient with the identity proximal
//! operator. Without a fixed step size, each iteration backtracks from the
//! previous step size until the quadratic upper bound
//!
//! ```text
//! f(x⁺) <= f(y) + <∇f(y), x⁺ - y> + ||x⁺ - y||² / (2s)
//! ```
//!
//! holds. The reported error is the norm of the gradient mapping
//! `||x⁺ - y|| / s`. Accelerated runs use FISTA momentum with adaptive
//! restart (O'Donoghue & Candès, 2015).

use crate::params::GlmParams;
use crate::regularizer::prox::ProxOperator;
use crate::solver::{Objective, OptStep, Solver, SolverAux, SolverKind, SolverOptions, SolverState};

const INITIAL_STEPSIZE: f64 = 1.0;

pub struct ProximalGradient {
    options: SolverOptions,
    prox: ProxOperator,
    kind: SolverKind,
}

impl ProximalGradient {
    pub fn new(options: SolverOptions, prox: ProxOperator) -> Self {
        Self {
            options,
            prox,
            kind: SolverKind::ProximalGradient,
        }
    }

    pub fn gradient_descent(options: SolverOptions) -> Self {
        Self {
            options,
            prox: ProxOperator::Identity,
            kind: SolverKind::GradientDescent,
        }
    }

    /// One forward-backward step from `point` with step size `s`.
    fn forward_backward(&self, point: &GlmParams, grad: &GlmParams, s: f64) -> GlmParams {
        self.prox.apply(&point.axpy(-s, grad), s)
    }

    /// Backtracking line search; returns the new iterate, its value and the
    /// accepted step size.
    fn line_search(
        &self,
        point: &GlmParams,
        value: f64,
        grad: &GlmParams,
        mut stepsize: f64,
        objective: &dyn Objective,
    ) -> (GlmParams, f64, f64) {
        let mut candidate = self.forward_backward(point, grad, stepsize);
        let mut candidate_value = objective.value(&candidate);

        for _ in 0..self.options.maxls {
            let diff = candidate.sub(point);
            let bound = value + grad.dot(&diff) + diff.dot(&diff) / (2.0 * stepsize);
            if candidate_value.is_finite() && candidate_value <= bound {
                break;
            }
            stepsize *= self.options.decrease_factor;
            candidate = self.forward_backward(point, grad, stepsize);
            candidate_value = objective.value(&candidate);
        }

        (candidate, candidate_value, stepsize)
    }
}

impl Solver for ProximalGradient {
    fn kind(&self) -> SolverKind {
        self.kind
    }

    fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn init_state(&self, params: &GlmParams, objective: &dyn Objective) -> SolverState {
        let aux = if self.options.acceleration {
            SolverAux::Fista {
                extrapolated: params.clone(),
                t: 1.0,
            }
        } else {
            SolverAux::None
        };
        let stepsize = self.options.stepsize.unwrap_or(INITIAL_STEPSIZE);
        SolverState::new(objective.value(params), stepsize, aux)
    }

    fn update(&self, params: &GlmParams, state: SolverState, objective: &dyn Objective) -> OptStep {
        let (point, t) = match &state.aux {
            SolverAux::Fista { extrapolated, t } => (extrapolated.clone(), *t),
            _ => (params.clone(), 1.0),
        };

        let (point_value, grad) = objective.value_and_gradient(&point);

        let (next, next_value, stepsize) = match self.options.stepsize {
            Some(fixed) => {
                let next = self.forward_backward(&point, &grad, fixed);
                let value = objective.value(&next);
                (next, value, fixed)
            }
            None => self.line_search(&point, point_value, &grad, state.stepsize, objective),
        };

        let error = next.sub(&point).norm() / stepsize;

        let aux = if self.options.acceleration {
            // Gradient-based adaptive restart: drop the momentum when it
            // points against the latest step.
            let restart = point.sub(&next).dot(&next.sub(params)) > 0.0;
            let t = if restart { 1.0 } else { t };
            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            let extrapolated = next.axpy(momentum, &next.sub(params));
            SolverAux::Fista {
                extrapolated,
                t: t_next,
            }
        } else {
            SolverAux::None
        };

        OptStep {
            params: next,
            state: SolverState {
                iter_num: state.iter_num + 1,
                error,
                value: next_value,
                stepsize,
                aux,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// `½||A p - b||²` on the coefficient part, used to test the engine on a
    /// problem with a closed-form minimiser.
    struct Quadratic;

    impl Objective for Quadratic {
        fn n_samples(&self) -> usize {
            1
        }

        fn value(&self, p: &GlmParams) -> f64 {
            0.5 * ((p.coef[0] - 1.0).powi(2) + 4.0 * (p.coef[1] + 2.0).powi(2) + (p.intercept - 3.0).powi(2))
        }

        fn gradient(&self, p: &GlmParams) -> GlmParams {
            GlmParams::new(array![p.coef[0] - 1.0, 4.0 * (p.coef[1] + 2.0)], p.intercept - 3.0)
        }

        fn batch_gradient(&self, p: &GlmParams, _rows: &[usize]) -> GlmParams {
            self.gradient(p)
        }
    }

    #[test]
    fn test_gradient_descent_finds_minimum() {
        for acceleration in [true, false] {
            let opts = SolverOptions {
                acceleration,
                tol: 1e-10,
                ..Default::default()
            };
            let solver = ProximalGradient::gradient_descent(opts);
            let out = solver.run(GlmParams::zeros(2), &Quadratic);
            assert!((out.params.coef[0] - 1.0).abs() < 1e-8);
            assert!((out.params.coef[1] + 2.0).abs() < 1e-8);
            assert!((out.params.intercept - 3.0).abs() < 1e-8);
        }
    }

    #[test]
    fn test_lasso_prox_shrinks_to_closed_form() {
        // argmin ½(w0-1)² + 2(w1+2)² + λ(|w0|+|w1|) with λ = 0.5:
        // w0 = 0.5, w1 = -2 + 0.5/4.
        let opts = SolverOptions {
            tol: 1e-10,
            ..Default::default()
        };
        let solver = ProximalGradient::new(opts, ProxOperator::Lasso(0.5));
        let out = solver.run(GlmParams::zeros(2), &Quadratic);
        assert!((out.params.coef[0] - 0.5).abs() < 1e-7);
        assert!((out.params.coef[1] + 1.875).abs() < 1e-7);
        assert!((out.params.intercept - 3.0).abs() < 1e-7);
    }

    #[test]
    fn test_fixed_stepsize_is_kept() {
        let opts = SolverOptions {
            stepsize: Some(0.1),
            acceleration: false,
            maxiter: 3,
            ..Default::default()
        };
        let solver = ProximalGradient::gradient_descent(opts);
        let out = solver.run(GlmParams::zeros(2), &Quadratic);
        assert_eq!(out.state.iter_num, 3);
        assert_eq!(out.state.stepsize, 0.1);
    }
}
