//! Observation models: how spike counts are generated from firing rates.
//!
//! - [`link`]: inverse link functions mapping the linear predictor to a rate
//! - [`poisson`]: Poisson observations (likelihood, deviance, pseudo-R²)
//! - [`sampling`]: Poisson random variates

pub mod link;
pub mod poisson;
pub mod sampling;

pub use link::InverseLink;
pub use poisson::{PoissonObservations, PseudoR2, ScoreType};
