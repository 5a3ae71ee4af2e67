//! Saving and loading fitted models.
//!
//! A model file is the JSON encoding of [`FittedModel`]. Paths ending in
//! `.zst` are zstd-compressed on save and decompressed on load.

use std::fs;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::GlmError;
use crate::glm::{FitResult, Glm};
use crate::observation::PoissonObservations;
use crate::params::GlmParams;
use crate::regularizer::Regularizer;
use crate::solver::{SolverKind, SolverOptions};

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed model file: {0}")]
    Format(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] GlmError),
}

/// Everything needed to rebuild a fitted [`Glm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub observation_model: PoissonObservations,
    pub regularizer: Regularizer,
    pub solver_name: SolverKind,
    pub solver_options: SolverOptions,
    pub coef: Array1<f64>,
    pub intercept: f64,
    pub scale: f64,
    pub dof_resid: f64,
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

impl FittedModel {
    pub fn from_glm(model: &Glm) -> Result<Self, GlmError> {
        let fitted = model.fit_result()?;
        Ok(Self {
            observation_model: *model.observation_model(),
            regularizer: model.regularizer().clone(),
            solver_name: model.solver_kind(),
            solver_options: model.solver_options().clone(),
            coef: fitted.params.coef.clone(),
            intercept: fitted.params.intercept,
            scale: fitted.scale,
            dof_resid: fitted.dof_resid,
        })
    }

    /// Write the model; `zstd_level` applies only to `.zst` paths.
    pub fn save(&self, path: &Path, zstd_level: i32) -> Result<(), PersistError> {
        let json = serde_json::to_vec_pretty(self)?;
        let bytes = if is_compressed(path) {
            zstd::encode_all(json.as_slice(), zstd_level)?
        } else {
            json
        };
        fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "Model saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let raw = fs::read(path)?;
        let json = if is_compressed(path) {
            zstd::decode_all(raw.as_slice())?
        } else {
            raw
        };
        let model: FittedModel = serde_json::from_slice(&json)?;
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<(), GlmError> {
        self.regularizer.validate()?;
        self.regularizer.check_solver(self.solver_name)?;
        self.regularizer.check_n_features(self.coef.len())?;
        self.solver_options.validate()?;
        GlmParams::new(self.coef.clone(), self.intercept).check_consistency(self.coef.len())
    }
}

impl Glm {
    /// Rebuild a fitted model from a snapshot.
    pub fn from_fitted(snapshot: FittedModel) -> Result<Self, GlmError> {
        snapshot.check()?;
        let mut model = Glm::new(snapshot.regularizer)
            .with_observation_model(snapshot.observation_model)
            .with_solver(snapshot.solver_name)?
            .with_solver_options(snapshot.solver_options)?;
        model.set_fitted(FitResult {
            params: GlmParams::new(snapshot.coef, snapshot.intercept),
            scale: snapshot.scale,
            dof_resid: snapshot.dof_resid,
        });
        Ok(model)
    }
}
