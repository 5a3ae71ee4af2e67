//! Crate-wide error type.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GlmError {
    /// An estimator was used before `fit` was called.
    #[error("This {model} instance is not fitted yet. Call 'fit' with appropriate arguments.")]
    NotFitted { model: &'static str },

    #[error("Invalid parameter {name:?} for estimator. Valid parameters are: {valid:?}.")]
    InvalidParameter { name: String, valid: Vec<String> },

    #[error("Invalid value for {name:?}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error(
        "The solver: {solver} is not allowed for {regularizer} regularization. \
         Allowed solvers are {allowed:?}."
    )]
    SolverNotAllowed {
        solver: String,
        regularizer: String,
        allowed: Vec<String>,
    },

    #[error("Unknown solver option: {0}")]
    UnknownSolverOption(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("At least a single sample must be valid (no NaN or infinite values in X or y)")]
    AllInvalid,

    #[error("Non-finite values found in {0}")]
    NonFinite(String),

    #[error("Unknown regularizer {0:?}. Valid names are: unregularized, ridge, lasso, group_lasso")]
    UnknownRegularizer(String),

    #[error("Unknown solver {0:?}")]
    UnknownSolver(String),

    #[error("Unknown score type {0:?}. Valid types are: log-likelihood, pseudo-r2-McFadden, pseudo-r2-Cohen")]
    UnknownScoreType(String),
}

pub type Result<T> = std::result::Result<T, GlmError>;

impl GlmError {
    pub(crate) fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GlmError::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
