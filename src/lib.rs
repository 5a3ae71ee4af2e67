//! spikeglm: generalized linear models for neural spike counts.
//!
//! Fits Poisson GLMs to binned spike trains with optional ridge, lasso or
//! group-lasso penalties, and simulates single neurons or recurrently
//! coupled populations from fitted parameters.
//!
//! - [`glm`]: the estimator (`fit`, `predict`, `score`, `simulate`, `update`)
//! - [`observation`]: Poisson observations, inverse links, sampling
//! - [`regularizer`]: penalties and their proximal operators
//! - [`solver`]: gradient, proximal, quasi-Newton and variance-reduced solvers
//! - [`basis`]: raised-cosine bases and spike-history design matrices
//! - [`simulation`]: recurrent population simulation
//! - [`estimator`]: nested parameter get/set
//! - [`persist`]: model files
//! - [`backend`]: compute device discovery

pub mod backend;
pub mod basis;
pub mod config;
pub mod error;
pub mod estimator;
pub mod glm;
pub mod math;
pub mod observation;
pub mod params;
pub mod persist;
pub mod regularizer;
pub mod simulation;
pub mod solver;
pub mod validation;

pub use error::{GlmError, Result};
pub use estimator::{ParamMap, ParamValue, Params};
pub use glm::{FitResult, Glm};
pub use observation::{InverseLink, PoissonObservations, ScoreType};
pub use params::GlmParams;
pub use regularizer::Regularizer;
pub use solver::{SolverKind, SolverOptions, SolverState};
