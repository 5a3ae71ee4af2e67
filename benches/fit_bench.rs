//! Benchmarks for fitting and simulation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spikeglm::basis::{history_design, RaisedCosineLog};
use spikeglm::observation::sampling::sample_poisson;
use spikeglm::simulation::RecurrentSimulator;
use spikeglm::{Glm, PoissonObservations, Regularizer, SolverKind};

fn toy_data(n_samples: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(0);
    let x = Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-0.5..0.5));
    let w = Array1::from_shape_fn(n_features, |j| if j % 2 == 0 { 0.5 } else { 0.0 });
    let y = x.dot(&w).mapv(|eta| sample_poisson(&mut rng, eta.exp()) as f64);
    (x, y)
}

fn bench_fit(c: &mut Criterion) {
    // 2,000 bins x 20 features.
    let (x, y) = toy_data(2_000, 20);

    for (name, regularizer, solver) in [
        ("fit_gd_unregularized_2k", Regularizer::Unregularized, SolverKind::GradientDescent),
        ("fit_lbfgs_ridge_2k", Regularizer::ridge(0.1), SolverKind::Lbfgs),
        ("fit_pg_lasso_2k", Regularizer::lasso(0.01), SolverKind::ProximalGradient),
    ] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut model = Glm::new(regularizer.clone()).with_solver(solver).unwrap();
                model.fit(black_box(x.view()), black_box(y.view()), None).unwrap();
                black_box(model.intercept().unwrap());
            })
        });
    }
}

fn bench_history_design(c: &mut Criterion) {
    let (_, basis) = RaisedCosineLog::new(8).unwrap().evaluate_on_grid(100).unwrap();
    let counts = toy_data(10_000, 4).0.mapv(|v| if v > 0.3 { 1.0 } else { 0.0 });

    c.bench_function("history_design_10k_x4", |b| {
        b.iter(|| black_box(history_design(black_box(counts.view()), basis.view())))
    });
}

fn bench_recurrent_simulation(c: &mut Criterion) {
    let n = 10;
    let (_, basis) = RaisedCosineLog::new(4).unwrap().evaluate_on_grid(50).unwrap();
    let simulator = RecurrentSimulator::new(
        Array1::from_elem(n, -2.0),
        Array2::zeros((n, 1)),
        Array3::from_elem((n, n, 4), -0.05),
        basis,
        PoissonObservations::default(),
    )
    .unwrap();
    let feedforward = Array2::zeros((5_000, 1));
    let init = Array2::zeros((50, n));

    c.bench_function("simulate_recurrent_10x5k", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(1);
            black_box(simulator.simulate(&mut rng, feedforward.view(), init.view()).unwrap())
        })
    });
}

criterion_group!(benches, bench_fit, bench_history_design, bench_recurrent_simulation);
criterion_main!(benches);
