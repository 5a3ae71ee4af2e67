//! Simulation of recurrently coupled populations.
//!
//! Every neuron's rate at bin `t` combines its intercept, a feed-forward
//! drive and the recent spiking of the population filtered through a
//! shared coupling basis:
//!
//! ```text
//! η[t, n] = b[n] + Σ_f X[t, f] w[n, f] + Σ_m Σ_k c[n, m, k] Σ_j s[t-1-j, m] B[j, k]
//! ```
//!
//! Counts are drawn bin by bin, so each draw feeds the history of the next.

use std::collections::VecDeque;

use ndarray::{Array1, Array2, Array3, ArrayView2};
use rand::Rng;
use tracing::debug;

use crate::error::{GlmError, Result};
use crate::observation::PoissonObservations;

#[derive(Debug, Clone)]
pub struct RecurrentSimulator {
    /// One intercept per neuron.
    pub intercepts: Array1<f64>,
    /// `N × F` feed-forward weights.
    pub feedforward_coef: Array2<f64>,
    /// `N_post × N_pre × K` coupling weights onto the basis.
    pub coupling_coef: Array3<f64>,
    /// `W × K` basis; row `j` weights lag `j + 1`.
    pub coupling_basis: Array2<f64>,
    pub observations: PoissonObservations,
}

impl RecurrentSimulator {
    pub fn new(
        intercepts: Array1<f64>,
        feedforward_coef: Array2<f64>,
        coupling_coef: Array3<f64>,
        coupling_basis: Array2<f64>,
        observations: PoissonObservations,
    ) -> Result<Self> {
        let n = intercepts.len();
        if feedforward_coef.nrows() != n {
            return Err(GlmError::ShapeMismatch(format!(
                "feedforward_coef has {} rows, expected one per neuron ({n})",
                feedforward_coef.nrows()
            )));
        }
        let (post, pre, k) = coupling_coef.dim();
        if post != n || pre != n {
            return Err(GlmError::ShapeMismatch(format!(
                "coupling_coef must be {n} x {n} x K, got {post} x {pre} x {k}"
            )));
        }
        if coupling_basis.ncols() != k {
            return Err(GlmError::ShapeMismatch(format!(
                "coupling_basis has {} functions but coupling_coef expects {k}",
                coupling_basis.ncols()
            )));
        }
        Ok(Self {
            intercepts,
            feedforward_coef,
            coupling_coef,
            coupling_basis,
            observations,
        })
    }

    pub fn n_neurons(&self) -> usize {
        self.intercepts.len()
    }

    pub fn window_size(&self) -> usize {
        self.coupling_basis.nrows()
    }

    /// Simulate `T` bins driven by `feedforward` (`T × F`), starting from the
    /// activity `init` (`W × N`, oldest bin first).
    ///
    /// Returns `(counts, rates)`, both `T × N`.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        feedforward: ArrayView2<'_, f64>,
        init: ArrayView2<'_, f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let n = self.n_neurons();
        let window = self.window_size();
        let n_basis = self.coupling_basis.ncols();

        if feedforward.ncols() != self.feedforward_coef.ncols() {
            return Err(GlmError::ShapeMismatch(format!(
                "feedforward input has {} features, model expects {}",
                feedforward.ncols(),
                self.feedforward_coef.ncols()
            )));
        }
        if init.dim() != (window, n) {
            return Err(GlmError::ShapeMismatch(format!(
                "init must be {window} x {n} (window x neurons), got {} x {}",
                init.nrows(),
                init.ncols()
            )));
        }
        if feedforward.iter().chain(init.iter()).any(|v| !v.is_finite()) {
            return Err(GlmError::NonFinite("simulation input".into()));
        }

        let n_time = feedforward.nrows();
        let drive = feedforward.dot(&self.feedforward_coef.t());

        // Most recent bin at the front.
        let mut history: VecDeque<Array1<f64>> = init.rows().into_iter().rev().map(|r| r.to_owned()).collect();
        let mut counts = Array2::zeros((n_time, n));
        let mut rates = Array2::zeros((n_time, n));
        let mut filtered = Array2::<f64>::zeros((n, n_basis));

        for t in 0..n_time {
            // filtered[m, k] = Σ_j s[t-1-j, m] B[j, k]
            filtered.fill(0.0);
            for (lag, past) in history.iter().enumerate() {
                for m in 0..n {
                    let s = past[m];
                    if s == 0.0 {
                        continue;
                    }
                    for k in 0..n_basis {
                        filtered[[m, k]] += s * self.coupling_basis[[lag, k]];
                    }
                }
            }

            let mut eta = &self.intercepts + &drive.row(t);
            for post in 0..n {
                let coupling = self.coupling_coef.index_axis(ndarray::Axis(0), post);
                eta[post] += (&coupling * &filtered).sum();
            }

            let rate = self.observations.rates(eta.view());
            if rate.iter().any(|r| !r.is_finite()) {
                return Err(GlmError::NonFinite(format!("simulated rates at bin {t}")));
            }
            let spikes = self.observations.sample(rng, rate.view());

            rates.row_mut(t).assign(&rate);
            counts.row_mut(t).assign(&spikes);

            if window > 0 {
                history.pop_back();
                history.push_front(spikes);
            }
        }

        debug!(
            n_neurons = n,
            n_time,
            total_spikes = counts.sum(),
            "Recurrent population simulated"
        );
        Ok((counts, rates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn uncoupled(n: usize) -> RecurrentSimulator {
        RecurrentSimulator::new(
            Array1::from_elem(n, 0.5_f64.ln()),
            Array2::zeros((n, 1)),
            Array3::zeros((n, n, 2)),
            array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]],
            PoissonObservations::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_uncoupled_rates_equal_baseline() {
        let sim = uncoupled(2);
        let mut rng = StdRng::seed_from_u64(7);
        let ff = Array2::zeros((50, 1));
        let init = Array2::zeros((3, 2));
        let (counts, rates) = sim.simulate(&mut rng, ff.view(), init.view()).unwrap();
        assert_eq!(counts.dim(), (50, 2));
        assert!(rates.iter().all(|r| (r - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_self_coupling_follows_history() {
        let mut sim = uncoupled(1);
        // Strong self-excitation through lag 1 only.
        sim.coupling_coef[[0, 0, 0]] = 1.0;
        let mut rng = StdRng::seed_from_u64(0);
        let ff = Array2::zeros((1, 1));
        let init = array![[0.0], [0.0], [2.0]];
        let (_, rates) = sim.simulate(&mut rng, ff.view(), init.view()).unwrap();
        assert!((rates[[0, 0]] - 0.5 * 2.0_f64.exp()).abs() < 1e-12);
    }

    #[test]
    fn test_overflowing_rates_are_an_error() {
        let mut sim = uncoupled(2);
        sim.intercepts[1] = 800.0;
        let mut rng = StdRng::seed_from_u64(0);
        let ff = Array2::zeros((4, 1));
        let init = Array2::zeros((3, 2));
        assert!(matches!(
            sim.simulate(&mut rng, ff.view(), init.view()),
            Err(GlmError::NonFinite(_))
        ));
    }

    #[test]
    fn test_shape_errors() {
        let sim = uncoupled(2);
        let mut rng = StdRng::seed_from_u64(0);
        let ff = Array2::zeros((5, 3));
        let init = Array2::zeros((3, 2));
        assert!(matches!(
            sim.simulate(&mut rng, ff.view(), init.view()),
            Err(GlmError::ShapeMismatch(_))
        ));
        assert!(RecurrentSimulator::new(
            Array1::zeros(2),
            Array2::zeros((3, 1)),
            Array3::zeros((2, 2, 1)),
            Array2::zeros((4, 1)),
            PoissonObservations::default(),
        )
        .is_err());
    }
}
