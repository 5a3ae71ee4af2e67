//! Poisson observations for spike-count data.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GlmError, Result};
use crate::estimator::{unknown_param, ParamMap, ParamValue, Params};
use crate::math::ln_gamma;
use crate::observation::link::InverseLink;
use crate::observation::sampling::sample_poisson;

/// Rates are floored here before taking logarithms.
const RATE_FLOOR: f64 = 1e-12;

/// Flavour of pseudo-R² used by [`PoissonObservations::pseudo_r2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PseudoR2 {
    McFadden,
    Cohen,
}

/// Metric returned by `Glm::score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreType {
    #[default]
    #[serde(rename = "log-likelihood")]
    LogLikelihood,
    #[serde(rename = "pseudo-r2-McFadden")]
    PseudoR2McFadden,
    #[serde(rename = "pseudo-r2-Cohen")]
    PseudoR2Cohen,
}

impl FromStr for ScoreType {
    type Err = GlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log-likelihood" => Ok(ScoreType::LogLikelihood),
            "pseudo-r2-McFadden" => Ok(ScoreType::PseudoR2McFadden),
            "pseudo-r2-Cohen" => Ok(ScoreType::PseudoR2Cohen),
            other => Err(GlmError::UnknownScoreType(other.to_string())),
        }
    }
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScoreType::LogLikelihood => "log-likelihood",
            ScoreType::PseudoR2McFadden => "pseudo-r2-McFadden",
            ScoreType::PseudoR2Cohen => "pseudo-r2-Cohen",
        })
    }
}

/// Poisson observation model with a configurable inverse link.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoissonObservations {
    #[serde(default)]
    pub inverse_link: InverseLink,
}

impl PoissonObservations {
    pub fn new(inverse_link: InverseLink) -> Self {
        Self { inverse_link }
    }

    pub fn name(&self) -> &'static str {
        "poisson"
    }

    /// Rates for a vector of linear predictors.
    pub fn rates(&self, eta: ArrayView1<'_, f64>) -> Array1<f64> {
        let link = self.inverse_link;
        eta.mapv(|e| link.apply(e))
    }

    /// Mean negative log-likelihood, without the `ln(y!)` constant.
    pub fn negative_log_likelihood(&self, rate: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
        let n = y.len().max(1) as f64;
        let mut total = 0.0;
        Zip::from(rate).and(y).for_each(|&r, &y| {
            total += r - y * r.max(RATE_FLOOR).ln();
        });
        total / n
    }

    /// Derivative of [`Self::negative_log_likelihood`] with respect to each
    /// linear predictor, already divided by the number of samples.
    pub fn nll_gradient_wrt_eta(&self, eta: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Array1<f64> {
        let n = y.len().max(1) as f64;
        let link = self.inverse_link;
        let mut out = Array1::zeros(eta.len());
        Zip::from(&mut out).and(eta).and(y).for_each(|g, &e, &y| {
            *g = match link {
                // d/dη (e^η - yη) = e^η - y
                InverseLink::Exp => e.exp() - y,
                InverseLink::Softplus => {
                    let r = link.apply(e).max(RATE_FLOOR);
                    link.derivative(e) * (1.0 - y / r)
                }
            } / n;
        });
        out
    }

    /// Mean full log-likelihood, including `-ln(y!)`.
    pub fn log_likelihood(&self, rate: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
        let n = y.len().max(1) as f64;
        let mut total = 0.0;
        Zip::from(rate).and(y).for_each(|&r, &y| {
            total += y * r.max(RATE_FLOOR).ln() - r - ln_gamma(y + 1.0);
        });
        total / n
    }

    /// Per-sample residual deviance `2 (y ln(y/r) - (y - r))`.
    pub fn deviance(&self, rate: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut out = Array1::zeros(y.len());
        Zip::from(&mut out).and(rate).and(y).for_each(|d, &r, &y| {
            let r = r.max(RATE_FLOOR);
            let ratio_term = if y > 0.0 { y * (y / r).ln() } else { 0.0 };
            *d = 2.0 * (ratio_term - (y - r));
        });
        out
    }

    /// Pseudo-R² of `rate` against a null model predicting the mean count.
    pub fn pseudo_r2(&self, rate: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>, kind: PseudoR2) -> f64 {
        let mean_y = y.mean().unwrap_or(0.0);
        let null_rate = Array1::from_elem(y.len(), mean_y);
        match kind {
            PseudoR2::McFadden => {
                let ll_model = self.log_likelihood(rate, y);
                let ll_null = self.log_likelihood(null_rate.view(), y);
                1.0 - ll_model / ll_null
            }
            PseudoR2::Cohen => {
                let dev_model = self.deviance(rate, y).sum();
                let dev_null = self.deviance(null_rate.view(), y).sum();
                1.0 - dev_model / dev_null
            }
        }
    }

    /// Dispersion of the observations; fixed at 1 for Poisson counts.
    pub fn estimate_scale(&self, _rate: ArrayView1<'_, f64>, _y: ArrayView1<'_, f64>) -> f64 {
        1.0
    }

    /// Draw one count per rate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, rate: ArrayView1<'_, f64>) -> Array1<f64> {
        rate.mapv(|r| sample_poisson(rng, r) as f64)
    }

    /// Intercept that reproduces the mean count when all weights are zero.
    pub fn initial_intercept(&self, mean_y: f64) -> f64 {
        self.inverse_link.link(mean_y.max(RATE_FLOOR))
    }

    pub fn score(&self, rate: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>, score_type: ScoreType) -> f64 {
        match score_type {
            ScoreType::LogLikelihood => self.log_likelihood(rate, y),
            ScoreType::PseudoR2McFadden => self.pseudo_r2(rate, y, PseudoR2::McFadden),
            ScoreType::PseudoR2Cohen => self.pseudo_r2(rate, y, PseudoR2::Cohen),
        }
    }
}

impl Params for PoissonObservations {
    fn own_params(&self) -> ParamMap {
        let mut out = ParamMap::new();
        out.insert("inverse_link".into(), self.inverse_link.name().into());
        out
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "inverse_link" => {
                self.inverse_link = value.as_str(name)?.parse()?;
                Ok(())
            }
            other => Err(unknown_param(&*self, other)),
        }
    }
}
