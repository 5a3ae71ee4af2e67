//! End-to-end behaviour of the GLM estimator: synthetic recovery, nested
//! parameters, persistence and simulation.

use ndarray::{array, s, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use spikeglm::basis::{history_design, RaisedCosineLog};
use spikeglm::persist::FittedModel;
use spikeglm::simulation::RecurrentSimulator;
use spikeglm::{
    FitResult, Glm, GlmError, GlmParams, ParamValue, Params, PoissonObservations, Regularizer, ScoreType,
    SolverKind,
};

#[test]
fn test_self_inhibiting_neuron_is_recovered() {
    let (n_time, window) = (5000, 100);
    let true_coef = array![0.0, 0.0, -1.0, -1.0, -1.0];
    let baseline = 0.1;

    let (_, basis) = RaisedCosineLog::new(5).unwrap().evaluate_on_grid(window).unwrap();
    let simulator = RecurrentSimulator::new(
        array![baseline],
        Array2::zeros((1, 1)),
        true_coef.clone().into_shape_with_order((1, 1, 5)).unwrap(),
        basis.clone(),
        PoissonObservations::default(),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(123);
    let (counts, _) = simulator
        .simulate(&mut rng, Array2::zeros((n_time, 1)).view(), Array2::zeros((window, 1)).view())
        .unwrap();
    assert!(counts.sum() > 0.0);

    let x = history_design(counts.view(), basis.view());
    let y = counts.column(0).to_owned();

    let mut fitted = Glm::default().with_solver(SolverKind::Lbfgs).unwrap();
    fitted.fit(x.view(), y.view(), None).unwrap();
    assert!(fitted.solver_state().unwrap().converged(1e-6));

    let mut truth = Glm::default();
    truth.set_fitted(FitResult {
        params: GlmParams::new(true_coef.clone(), baseline),
        scale: 1.0,
        dof_resid: 0.0,
    });

    // The maximum-likelihood fit explains the data at least as well as the
    // generating parameters.
    let ll_fit = fitted.score(x.view(), y.view(), ScoreType::LogLikelihood).unwrap();
    let ll_true = truth.score(x.view(), y.view(), ScoreType::LogLikelihood).unwrap();
    assert!(ll_fit >= ll_true - 1e-8);

    // With an intercept, fitted rates reproduce the mean count.
    let valid = window..n_time;
    let rate = fitted.predict(x.slice(s![valid.clone(), ..])).unwrap();
    let mean_y = y.slice(s![valid]).mean().unwrap();
    assert!((rate.mean().unwrap() - mean_y).abs() < 1e-4);

    // The recovered history filter is inhibitory overall.
    let filter = basis.dot(&fitted.coef().unwrap());
    assert!(filter.sum() < 0.0);
}

#[test]
fn test_deep_params_expose_components() {
    let model = Glm::new(Regularizer::ridge(0.5));
    let params = model.get_params(true);
    assert_eq!(params["regularizer"], ParamValue::from("ridge"));
    assert_eq!(params["regularizer__regularizer_strength"], ParamValue::Float(0.5));
    assert_eq!(params["observation_model__inverse_link"], ParamValue::from("exp"));
    assert_eq!(params["solver_options__maxiter"], ParamValue::Int(1000));
    assert_eq!(params["solver_name"], ParamValue::from("GradientDescent"));

    let shallow = model.get_params(false);
    assert!(!shallow.contains_key("regularizer__regularizer_strength"));
}

#[test]
fn test_set_params_nested_and_invalid() {
    let mut model = Glm::default();
    model
        .set_params([
            ("regularizer", ParamValue::from("lasso")),
            ("regularizer__regularizer_strength", ParamValue::Float(0.2)),
            ("solver_options__maxiter", ParamValue::from(50_usize)),
            ("observation_model__inverse_link", ParamValue::from("softplus")),
        ])
        .unwrap();
    assert_eq!(model.regularizer(), &Regularizer::lasso(0.2));
    assert_eq!(model.solver_options().maxiter, 50);
    assert_eq!(model.solver_kind(), SolverKind::ProximalGradient);

    let err = model
        .set_params([("not_a_param", ParamValue::Float(1.0))])
        .unwrap_err();
    assert!(matches!(err, GlmError::InvalidParameter { ref name, .. } if name == "not_a_param"));

    let err = model
        .set_params([("solver_options__momentum", ParamValue::Float(0.9))])
        .unwrap_err();
    assert!(matches!(err, GlmError::UnknownSolverOption(_)));
}

#[test]
fn test_not_fitted_message() {
    let model = Glm::default();
    let err = model.score(array![[1.0]].view(), array![1.0].view(), ScoreType::LogLikelihood);
    assert_eq!(
        err.unwrap_err().to_string(),
        "This GLM instance is not fitted yet. Call 'fit' with appropriate arguments."
    );
}

#[test]
fn test_fit_ignores_nan_rows() {
    let x = array![[0.0], [f64::NAN], [0.0], [0.0], [0.0]];
    let y = array![2.0, 100.0, 2.0, f64::NAN, 2.0];
    let mut model = Glm::default();
    model.fit(x.view(), y.view(), None).unwrap();
    assert!((model.intercept().unwrap() - 2.0_f64.ln()).abs() < 1e-6);
    assert_eq!(model.fit_result().unwrap().dof_resid, 1.0);
}

#[test]
fn test_all_nan_data_is_rejected() {
    let x = array![[f64::NAN], [1.0]];
    let y = array![1.0, f64::NAN];
    let mut model = Glm::default();
    assert!(matches!(model.fit(x.view(), y.view(), None), Err(GlmError::AllInvalid)));
}

#[test]
fn test_saved_model_predicts_identically() {
    let x = array![[0.1, 0.5], [0.3, -0.2], [-0.4, 0.2], [0.0, 0.9], [0.6, -0.7], [-0.2, -0.1]];
    let y = array![1.0, 0.0, 2.0, 3.0, 0.0, 1.0];
    let mut model = Glm::new(Regularizer::ridge(0.1));
    model.fit(x.view(), y.view(), None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json.zst");
    FittedModel::from_glm(&model).unwrap().save(&path, 19).unwrap();
    let restored = Glm::from_fitted(FittedModel::load(&path).unwrap()).unwrap();

    assert_eq!(model.predict(x.view()).unwrap(), restored.predict(x.view()).unwrap());
    assert_eq!(restored.regularizer(), &Regularizer::ridge(0.1));
}

#[test]
fn test_unfitted_model_cannot_be_saved() {
    assert!(matches!(
        FittedModel::from_glm(&Glm::default()),
        Err(GlmError::NotFitted { .. })
    ));
}

#[test]
fn test_simulated_counts_track_rates() {
    let mut model = Glm::default();
    model.set_fitted(FitResult {
        params: GlmParams::new(array![1.0], 0.0),
        scale: 1.0,
        dof_resid: 0.0,
    });
    let x = Array2::from_shape_fn((4000, 1), |(t, _)| if t % 2 == 0 { 0.0 } else { 2.0_f64.ln() });
    let mut rng = StdRng::seed_from_u64(42);
    let (counts, rates) = model.simulate(&mut rng, x.view()).unwrap();

    let mean_at = |parity: usize| {
        let picked: Array1<f64> = counts.iter().skip(parity).step_by(2).copied().collect();
        picked.mean().unwrap()
    };
    assert!((mean_at(0) - 1.0).abs() < 0.1);
    assert!((mean_at(1) - 2.0).abs() < 0.15);
    assert!((rates[1] - 2.0).abs() < 1e-12);
}

#[test]
fn test_pseudo_r2_of_informative_model_is_positive() {
    let x = Array2::from_shape_fn((600, 1), |(t, _)| (t % 3) as f64 - 1.0);
    let mut truth = Glm::default();
    truth.set_fitted(FitResult {
        params: GlmParams::new(array![1.2], 0.3),
        scale: 1.0,
        dof_resid: 0.0,
    });
    let mut rng = StdRng::seed_from_u64(8);
    let (y, _) = truth.simulate(&mut rng, x.view()).unwrap();

    let mut model = Glm::default();
    model.fit(x.view(), y.view(), None).unwrap();
    for score_type in [ScoreType::PseudoR2McFadden, ScoreType::PseudoR2Cohen] {
        let r2 = model.score(x.view(), y.view(), score_type).unwrap();
        assert!(r2 > 0.0 && r2 < 1.0, "{score_type}: {r2}");
    }
}

#[test]
fn test_group_lasso_mask_must_match_features() {
    let mask = array![[1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let mut model = Glm::new(Regularizer::group_lasso(0.1, mask).unwrap());
    let x = Array2::<f64>::zeros((4, 2));
    let y = Array1::<f64>::ones(4);
    assert!(matches!(model.fit(x.view(), y.view(), None), Err(GlmError::ShapeMismatch(_))));
}

#[test]
fn test_update_rejects_group_lasso_mask_of_other_width() {
    let x = array![[0.1, 0.5], [0.3, -0.2], [-0.4, 0.2], [0.0, 0.9]];
    let y = array![1.0, 0.0, 2.0, 3.0];
    let (params, state) = Glm::new(Regularizer::lasso(0.1))
        .initialize_solver(x.view(), y.view(), None)
        .unwrap();

    let mask = array![[1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let mut model = Glm::new(Regularizer::group_lasso(0.1, mask).unwrap());
    let err = model.update(&params, state, x.view(), y.view()).unwrap_err();
    assert!(matches!(err, GlmError::ShapeMismatch(_)));
    assert!(model.fit_result().is_err());
}

#[test]
fn test_update_rejects_state_of_other_width() {
    let wide = array![[0.1, 0.5, 1.0], [0.3, -0.2, 0.0], [-0.4, 0.2, 0.5], [0.0, 0.9, -1.0]];
    let x = wide.slice(s![.., ..2]).to_owned();
    let y = array![1.0, 0.0, 2.0, 3.0];
    let params = GlmParams::new(Array1::zeros(2), 0.0);

    for kind in [SolverKind::ProximalGradient, SolverKind::Lbfgs] {
        let mut model = Glm::new(Regularizer::ridge(0.1)).with_solver(kind).unwrap();
        let (_, wide_state) = model.initialize_solver(wide.view(), y.view(), None).unwrap();
        let err = model.update(&params, wide_state, x.view(), y.view()).unwrap_err();
        assert!(matches!(err, GlmError::ShapeMismatch(_)), "{kind}");
    }
}
