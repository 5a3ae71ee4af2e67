//! The smooth part of the GLM objective.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::observation::{InverseLink, PoissonObservations};
use crate::params::GlmParams;
use crate::solver::svrg_defaults;

/// A differentiable objective over [`GlmParams`].
pub trait Objective {
    fn n_samples(&self) -> usize;

    fn value(&self, params: &GlmParams) -> f64;

    fn gradient(&self, params: &GlmParams) -> GlmParams;

    fn value_and_gradient(&self, params: &GlmParams) -> (f64, GlmParams) {
        (self.value(params), self.gradient(params))
    }

    /// Gradient of the loss restricted to `rows`, averaged over them.
    fn batch_gradient(&self, params: &GlmParams, rows: &[usize]) -> GlmParams;

    /// `(L_max, L)` smoothness constants when they are known in closed form.
    fn smoothness_constants(&self) -> Option<(f64, f64)> {
        None
    }
}

/// Mean negative log-likelihood of a GLM, optionally plus `½λ||w||²`.
pub struct GlmObjective<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    observations: PoissonObservations,
    ridge: Option<f64>,
}

impl<'a> GlmObjective<'a> {
    pub fn new(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>, observations: PoissonObservations) -> Self {
        Self {
            x,
            y,
            observations,
            ridge: None,
        }
    }

    /// Fold a quadratic penalty of the given strength into the objective.
    pub fn with_ridge(mut self, strength: Option<f64>) -> Self {
        self.ridge = strength;
        self
    }

    fn gradient_on(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, params: &GlmParams) -> GlmParams {
        let eta = params.linear_predictor(x);
        let g_eta = self.observations.nll_gradient_wrt_eta(eta.view(), y);
        let mut coef = x.t().dot(&g_eta);
        if let Some(strength) = self.ridge {
            coef.scaled_add(strength, &params.coef);
        }
        GlmParams::new(coef, g_eta.sum())
    }
}

impl Objective for GlmObjective<'_> {
    fn n_samples(&self) -> usize {
        self.y.len()
    }

    fn value(&self, params: &GlmParams) -> f64 {
        let eta = params.linear_predictor(self.x);
        let rate = self.observations.rates(eta.view());
        let mut value = self.observations.negative_log_likelihood(rate.view(), self.y);
        if let Some(strength) = self.ridge {
            value += 0.5 * strength * params.coef.dot(&params.coef);
        }
        value
    }

    fn gradient(&self, params: &GlmParams) -> GlmParams {
        self.gradient_on(self.x, self.y, params)
    }

    fn batch_gradient(&self, params: &GlmParams, rows: &[usize]) -> GlmParams {
        let x = self.x.select(Axis(0), rows);
        let y: Array1<f64> = rows.iter().map(|&i| self.y[i]).collect();
        self.gradient_on(x.view(), y.view(), params)
    }

    fn smoothness_constants(&self) -> Option<(f64, f64)> {
        match self.observations.inverse_link {
            InverseLink::Softplus => {
                let design = svrg_defaults::with_intercept_column(self.x);
                let (l_max, l) = svrg_defaults::glm_softplus_poisson_l_max_and_l(
                    design.view(),
                    self.y,
                    svrg_defaults::DEFAULT_POWER_ITERS,
                );
                // The folded ridge term is λ-smooth in every sample loss.
                let lambda = self.ridge.unwrap_or(0.0);
                Some((l_max + lambda, l + lambda))
            }
            // The exponential link has no global Lipschitz constant.
            InverseLink::Exp => None,
        }
    }
}
