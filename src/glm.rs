//! Generalized linear model for a single neuron's spike counts.
//!
//! The model predicts a firing rate `r = f(Xw + b)` for every time bin,
//! where `f` is the inverse link of the observation model, and fits `w, b`
//! by minimising the (penalized) negative log-likelihood with the solver
//! selected for the regularizer.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GlmError, Result};
use crate::estimator::{apply_all, unknown_param, ParamMap, ParamValue, Params};
use crate::observation::{PoissonObservations, ScoreType};
use crate::params::GlmParams;
use crate::regularizer::{create_regularizer, Regularizer};
use crate::solver::{
    instantiate_solver, GlmObjective, Objective, OptStep, Solver, SolverKind, SolverOptions, SolverState,
};
use crate::validation;

const MODEL_NAME: &str = "GLM";

/// Quantities estimated by `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub params: GlmParams,
    /// Dispersion of the observations.
    pub scale: f64,
    /// Residual degrees of freedom.
    pub dof_resid: f64,
}

#[derive(Debug, Clone)]
pub struct Glm {
    observation_model: PoissonObservations,
    regularizer: Regularizer,
    solver_kind: SolverKind,
    solver_options: SolverOptions,
    fitted: Option<FitResult>,
    solver_state: Option<SolverState>,
}

impl Default for Glm {
    fn default() -> Self {
        Self {
            observation_model: PoissonObservations::default(),
            regularizer: Regularizer::Unregularized,
            solver_kind: Regularizer::Unregularized.default_solver(),
            solver_options: SolverOptions::default(),
            fitted: None,
            solver_state: None,
        }
    }
}

impl Glm {
    /// A model with the given regularizer and its default solver.
    pub fn new(regularizer: Regularizer) -> Self {
        Self {
            solver_kind: regularizer.default_solver(),
            regularizer,
            ..Default::default()
        }
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Result<Self> {
        self.set_solver(solver)?;
        Ok(self)
    }

    pub fn with_solver_options(mut self, options: SolverOptions) -> Result<Self> {
        options.validate()?;
        self.solver_options = options;
        Ok(self)
    }

    pub fn with_observation_model(mut self, observation_model: PoissonObservations) -> Self {
        self.observation_model = observation_model;
        self
    }

    pub fn observation_model(&self) -> &PoissonObservations {
        &self.observation_model
    }

    pub fn regularizer(&self) -> &Regularizer {
        &self.regularizer
    }

    /// Replace the regularizer. If the current solver cannot optimise the
    /// new penalty, the regularizer's default solver is selected.
    pub fn set_regularizer(&mut self, regularizer: Regularizer) {
        if !regularizer.allows(self.solver_kind) {
            info!(
                previous = %self.solver_kind,
                solver = %regularizer.default_solver(),
                regularizer = %regularizer,
                "Solver not allowed for regularizer, switching to its default"
            );
            self.solver_kind = regularizer.default_solver();
        }
        self.regularizer = regularizer;
    }

    pub fn solver_kind(&self) -> SolverKind {
        self.solver_kind
    }

    pub fn set_solver(&mut self, solver: SolverKind) -> Result<()> {
        self.regularizer.check_solver(solver)?;
        self.solver_kind = solver;
        Ok(())
    }

    pub fn solver_options(&self) -> &SolverOptions {
        &self.solver_options
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fit_result(&self) -> Result<&FitResult> {
        self.fitted.as_ref().ok_or(GlmError::NotFitted { model: MODEL_NAME })
    }

    pub fn coef(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.fit_result()?.params.coef.view())
    }

    pub fn intercept(&self) -> Result<f64> {
        Ok(self.fit_result()?.params.intercept)
    }

    pub fn params(&self) -> Result<&GlmParams> {
        Ok(&self.fit_result()?.params)
    }

    /// State of the last solver run or update.
    pub fn solver_state(&self) -> Option<&SolverState> {
        self.solver_state.as_ref()
    }

    /// Install externally obtained parameters, e.g. from a saved model.
    pub fn set_fitted(&mut self, fitted: FitResult) {
        self.fitted = Some(fitted);
    }

    /// Build the configured solver with the matching proximal operator.
    pub fn instantiate_solver(&self) -> Result<Box<dyn Solver>> {
        self.regularizer.check_solver(self.solver_kind)?;

        let mut options = self.solver_options.clone();
        if self.solver_kind.is_stochastic() && options.strong_convexity.is_none() {
            if let Regularizer::Ridge { regularizer_strength } = self.regularizer {
                options.strong_convexity = Some(regularizer_strength);
            }
        }

        instantiate_solver(self.solver_kind, options, self.regularizer.proximal_operator(self.solver_kind))
    }

    fn objective<'a>(&self, x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>) -> GlmObjective<'a> {
        GlmObjective::new(x, y, self.observation_model)
            .with_ridge(self.regularizer.smooth_penalty_for(self.solver_kind))
    }

    /// Zero weights and the intercept matching the mean count.
    pub fn initialize_params(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> GlmParams {
        let mean_y = y.mean().unwrap_or(0.0);
        if mean_y <= 0.0 {
            warn!("Mean spike count is zero; initializing the intercept at a tiny rate");
        }
        GlmParams::new(Array1::zeros(x.ncols()), self.observation_model.initial_intercept(mean_y))
    }

    fn validate_inputs(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, init: Option<&GlmParams>) -> Result<()> {
        if x.ncols() == 0 {
            return Err(GlmError::ShapeMismatch("X must have at least one feature".into()));
        }
        validation::check_n_timepoints(x, y)?;
        validation::error_all_invalid(x, y)?;
        validation::check_counts(y)?;
        self.regularizer.check_n_features(x.ncols())?;
        if let Some(init) = init {
            init.check_consistency(x.ncols())?;
        }
        Ok(())
    }

    /// Fit the model to spike counts `y` given the design `x`.
    ///
    /// Samples with non-finite entries are dropped before fitting.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, init: Option<GlmParams>) -> Result<&mut Self> {
        self.validate_inputs(x, y, init.as_ref())?;
        let (x, y) = validation::drop_invalid(x, y)?;

        let init = match init {
            Some(p) => p,
            None => self.initialize_params(x.view(), y.view()),
        };

        let solver = self.instantiate_solver()?;
        let objective = self.objective(x.view(), y.view());
        let OptStep { params, state } = solver.run(init, &objective);

        if !params.is_finite() {
            return Err(GlmError::NonFinite(
                "fitted parameters; try a smaller step size or stronger regularization".into(),
            ));
        }
        if !state.converged(self.solver_options.tol) {
            warn!(
                solver = %self.solver_kind,
                iterations = state.iter_num,
                error = state.error,
                "Solver did not converge; consider increasing maxiter"
            );
        }

        let nll = GlmObjective::new(x.view(), y.view(), self.observation_model);
        let loss = {
            let penalized_loss = self.regularizer.penalized_loss(|p: &GlmParams| nll.value(p));
            penalized_loss(&params)
        };
        info!(
            solver = %self.solver_kind,
            regularizer = %self.regularizer,
            n_samples = y.len(),
            n_features = x.ncols(),
            iterations = state.iter_num,
            error = state.error,
            loss = loss,
            "GLM fitted"
        );

        let rate = self.observation_model.rates(params.linear_predictor(x.view()).view());
        let scale = self.observation_model.estimate_scale(rate.view(), y.view());
        let dof_resid = self.residual_dof(&params, y.len());

        self.fitted = Some(FitResult {
            params,
            scale,
            dof_resid,
        });
        self.solver_state = Some(state);
        Ok(self)
    }

    fn residual_dof(&self, params: &GlmParams, n_samples: usize) -> f64 {
        let n_params = match self.regularizer {
            Regularizer::Lasso { .. } | Regularizer::GroupLasso { .. } => params.count_nonzero_coef(),
            _ => params.n_features(),
        };
        n_samples as f64 - n_params as f64 - 1.0
    }

    /// Validate the data and build the solver state for a manual
    /// optimisation loop driven by [`Glm::update`].
    pub fn initialize_solver(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        init: Option<GlmParams>,
    ) -> Result<(GlmParams, SolverState)> {
        self.validate_inputs(x, y, init.as_ref())?;
        let (x, y) = validation::drop_invalid(x, y)?;
        let params = match init {
            Some(p) => p,
            None => self.initialize_params(x.view(), y.view()),
        };
        let solver = self.instantiate_solver()?;
        let state = solver.init_state(&params, &self.objective(x.view(), y.view()));
        Ok((params, state))
    }

    /// Run a single solver step and store the resulting parameters.
    ///
    /// `x` and `y` must not contain non-finite samples.
    pub fn update(
        &mut self,
        params: &GlmParams,
        state: SolverState,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<OptStep> {
        validation::check_n_timepoints(x, y)?;
        params.check_consistency(x.ncols())?;
        self.regularizer.check_n_features(x.ncols())?;
        state.check_n_features(x.ncols())?;
        if validation::valid_samples(x, Some(y)).iter().any(|v| !*v) {
            return Err(GlmError::NonFinite("update data".into()));
        }

        let solver = self.instantiate_solver()?;
        let step = solver.update(params, state, &self.objective(x, y));
        debug!(iteration = step.state.iter_num, error = step.state.error, "Solver update");

        let rate = self.observation_model.rates(step.params.linear_predictor(x).view());
        self.fitted = Some(FitResult {
            params: step.params.clone(),
            scale: self.observation_model.estimate_scale(rate.view(), y),
            dof_resid: self.residual_dof(&step.params, y.len()),
        });
        self.solver_state = Some(step.state.clone());
        Ok(step)
    }

    /// Predicted firing rate for each row of `x`.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let params = self.params()?;
        validation::check_n_features(x, params.n_features())?;
        Ok(self.observation_model.rates(params.linear_predictor(x).view()))
    }

    /// Score the predicted rates against observed counts. Non-finite samples
    /// are ignored.
    pub fn score(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, score_type: ScoreType) -> Result<f64> {
        let params = self.params()?;
        validation::check_n_timepoints(x, y)?;
        validation::check_n_features(x, params.n_features())?;
        let (x, y) = validation::drop_invalid(x, y)?;
        let rate = self.observation_model.rates(params.linear_predictor(x.view()).view());
        Ok(self.observation_model.score(rate.view(), y.view(), score_type))
    }

    /// Draw spike counts from the fitted model for the design `x`.
    /// Returns `(counts, rates)`.
    pub fn simulate<R: Rng + ?Sized>(&self, rng: &mut R, x: ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let rates = self.predict(x)?;
        if rates.iter().any(|r| !r.is_finite()) {
            return Err(GlmError::NonFinite("simulation input".into()));
        }
        let counts = self.observation_model.sample(rng, rates.view());
        Ok((counts, rates))
    }
}

impl Params for Glm {
    fn own_params(&self) -> ParamMap {
        let mut out = ParamMap::new();
        out.insert("observation_model".into(), self.observation_model.name().into());
        out.insert("regularizer".into(), self.regularizer.name().into());
        out.insert("solver_name".into(), self.solver_kind.name().into());
        let options = serde_json::to_string(&self.solver_options).unwrap_or_default();
        out.insert("solver_options".into(), options.into());
        out
    }

    fn component_params(&self, name: &str) -> Option<ParamMap> {
        match name {
            "observation_model" => Some(self.observation_model.get_params(true)),
            "regularizer" => Some(self.regularizer.get_params(true)),
            "solver_options" => Some(self.solver_options.get_params(true)),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "observation_model" => match value.as_str(name)? {
                "poisson" => Ok(()),
                other => Err(GlmError::invalid_value(name, format!("unsupported observation model {other:?}"))),
            },
            "regularizer" => {
                let regularizer = create_regularizer(value.as_str(name)?)?;
                self.set_regularizer(regularizer);
                Ok(())
            }
            "solver_name" => {
                let kind: SolverKind = value.as_str(name)?.parse()?;
                self.set_solver(kind)
            }
            "solver_options" => {
                let raw = value.as_str(name)?;
                let json: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|e| GlmError::invalid_value(name, e.to_string()))?;
                let options = SolverOptions::from_json(json)?;
                options.validate()?;
                self.solver_options = options;
                Ok(())
            }
            other => Err(unknown_param(&*self, other)),
        }
    }

    fn set_component_params(&mut self, component: &str, params: Vec<(String, ParamValue)>) -> Result<()> {
        match component {
            "observation_model" => apply_all(&mut self.observation_model, params),
            "regularizer" => apply_all(&mut self.regularizer, params),
            "solver_options" => apply_all(&mut self.solver_options, params),
            other => Err(unknown_param(&*self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_predict_before_fit_is_not_fitted() {
        let model = Glm::default();
        let x = array![[1.0, 2.0], [2.0, 3.0]];
        assert_eq!(model.predict(x.view()), Err(GlmError::NotFitted { model: "GLM" }));
    }

    #[test]
    fn test_lasso_rejects_gradient_descent() {
        let err = Glm::new(Regularizer::lasso(0.1))
            .with_solver(SolverKind::GradientDescent)
            .unwrap_err();
        assert!(matches!(err, GlmError::SolverNotAllowed { .. }));
    }

    #[test]
    fn test_fit_rejects_mismatched_timepoints() {
        let mut model = Glm::default();
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0];
        assert!(matches!(model.fit(x.view(), y.view(), None), Err(GlmError::ShapeMismatch(_))));
    }

    #[test]
    fn test_fit_rejects_bad_init_params() {
        let mut model = Glm::default();
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 0.0];
        let init = GlmParams::zeros(2);
        assert!(matches!(
            model.fit(x.view(), y.view(), Some(init)),
            Err(GlmError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_intercept_only_fit_matches_mean_rate() {
        let mut model = Glm::default();
        let x = array![[0.0], [0.0], [0.0], [0.0]];
        let y = array![1.0, 3.0, 2.0, 2.0];
        model.fit(x.view(), y.view(), None).unwrap();
        assert!((model.intercept().unwrap() - 2.0_f64.ln()).abs() < 1e-6);
        assert_eq!(model.fit_result().unwrap().scale, 1.0);
    }

    #[test]
    fn test_setting_lasso_switches_default_solver() {
        let mut model = Glm::default();
        model.set_params([("regularizer", ParamValue::from("lasso"))]).unwrap();
        assert_eq!(model.solver_kind(), SolverKind::ProximalGradient);
        assert!(model
            .set_params([("solver_name", ParamValue::from("GradientDescent"))])
            .is_err());
    }
}
