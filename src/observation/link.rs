//! Inverse link functions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GlmError;
use crate::math::{sigmoid, softplus, softplus_inverse};

/// Maps the linear predictor `η = Xw + b` to a non-negative rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverseLink {
    #[default]
    Exp,
    Softplus,
}

impl InverseLink {
    pub fn apply(self, eta: f64) -> f64 {
        match self {
            InverseLink::Exp => eta.exp(),
            InverseLink::Softplus => softplus(eta),
        }
    }

    /// `d rate / d η`.
    pub fn derivative(self, eta: f64) -> f64 {
        match self {
            InverseLink::Exp => eta.exp(),
            InverseLink::Softplus => sigmoid(eta),
        }
    }

    /// The link itself: the `η` producing `rate`.
    pub fn link(self, rate: f64) -> f64 {
        match self {
            InverseLink::Exp => rate.ln(),
            InverseLink::Softplus => softplus_inverse(rate),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InverseLink::Exp => "exp",
            InverseLink::Softplus => "softplus",
        }
    }
}

impl fmt::Display for InverseLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InverseLink {
    type Err = GlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exp" => Ok(InverseLink::Exp),
            "softplus" => Ok(InverseLink::Softplus),
            other => Err(GlmError::invalid_value(
                "inverse_link",
                format!("unknown inverse link {other:?}, expected \"exp\" or \"softplus\""),
            )),
        }
    }
}
