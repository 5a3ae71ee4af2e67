//! Runtime configuration for spikeglm.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Model choices (link, penalty, solver and its options), simulation seeding
//! and output compression live here, next to the command-line surface.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{GlmError, Result};
use crate::estimator::{ParamValue, Params};
use crate::glm::Glm;
use crate::observation::{InverseLink, PoissonObservations};
use crate::regularizer::Regularizer;
use crate::solver::{SolverKind, SolverOptions};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "spikeglm", about = "Poisson GLMs for neural spike counts", version)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "spikeglm.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Report a GPU as the compute device when one is available.
    #[arg(long)]
    pub prefer_gpu: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fit a model to a dataset and save it.
    Fit {
        /// Dataset with `x` and `y`.
        #[arg(long)]
        data: PathBuf,

        /// Where to write the fitted model (`.zst` to compress).
        #[arg(short, long, default_value = "model.json")]
        output: PathBuf,

        /// Parameter override, e.g. `--set regularizer__regularizer_strength=0.1`.
        #[arg(long = "set", value_parser = parse_key_value)]
        overrides: Vec<(String, String)>,
    },

    /// Predict firing rates for the rows of `x`.
    Predict {
        #[arg(long)]
        data: PathBuf,

        #[arg(short, long)]
        model: PathBuf,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a fitted model against observed counts.
    Score {
        #[arg(long)]
        data: PathBuf,

        #[arg(short, long)]
        model: PathBuf,

        /// One of log-likelihood, pseudo-r2-McFadden, pseudo-r2-Cohen.
        #[arg(long, default_value = "log-likelihood")]
        score_type: String,
    },

    /// Draw spike counts from a fitted model.
    Simulate {
        #[arg(long)]
        data: PathBuf,

        #[arg(short, long)]
        model: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overrides `simulation.seed` from the config file.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List compute devices.
    Devices,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration.
    pub model: ModelConfig,

    /// Simulation settings.
    pub simulation: SimulationConfig,

    /// Model-file output settings.
    pub output: OutputConfig,
}

/// Model-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Inverse link of the Poisson observations.
    pub inverse_link: InverseLink,

    pub regularizer: Regularizer,

    /// Solver; the regularizer's default when unset.
    pub solver_name: Option<SolverKind>,

    pub solver_options: SolverOptions,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            inverse_link: InverseLink::Exp,
            regularizer: Regularizer::Unregularized,
            solver_name: None,
            solver_options: SolverOptions::default(),
        }
    }
}

impl ModelConfig {
    /// Build an unfitted model from these settings.
    pub fn build(&self) -> Result<Glm> {
        self.regularizer.validate()?;
        let mut model = Glm::new(self.regularizer.clone())
            .with_observation_model(PoissonObservations::new(self.inverse_link))
            .with_solver_options(self.solver_options.clone())?;
        if let Some(solver) = self.solver_name {
            model.set_solver(solver)?;
        }
        Ok(model)
    }
}

/// Simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed of the random generator used for spike sampling.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { seed: 123 }
    }
}

/// Compression settings for saved models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Always write zstd-compressed model files.
    pub compress: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compress: false,
            zstd_level: 3,
        }
    }
}

impl OutputConfig {
    /// Final model path: `.zst` is appended when compression is forced.
    pub fn model_path(&self, requested: &Path) -> PathBuf {
        let already = requested.extension().is_some_and(|ext| ext == "zst");
        if self.compress && !already {
            let mut name = requested.as_os_str().to_owned();
            name.push(".zst");
            PathBuf::from(name)
        } else {
            requested.to_path_buf()
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

/// Apply `key=value` overrides through [`Params::set_params`].
pub fn apply_overrides<P: Params + ?Sized>(target: &mut P, overrides: &[(String, String)]) -> Result<()> {
    if overrides.is_empty() {
        return Ok(());
    }
    target.set_params(
        overrides
            .iter()
            .map(|(key, raw)| (key.as_str(), ParamValue::parse(raw))),
    )
}

/// A dataset file: `{"x": [[...], ...], "y": [...]}`. `null` entries stand
/// for missing values and are read as NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub x: Vec<Vec<Option<f64>>>,

    #[serde(default)]
    pub y: Option<Vec<Option<f64>>>,
}

impl Dataset {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// The design matrix; every row must have the same length.
    pub fn design(&self) -> Result<Array2<f64>> {
        let n_rows = self.x.len();
        let n_cols = self.x.first().map_or(0, Vec::len);
        if let Some(bad) = self.x.iter().position(|row| row.len() != n_cols) {
            return Err(GlmError::ShapeMismatch(format!(
                "row {bad} of x has {} entries, expected {n_cols}",
                self.x[bad].len()
            )));
        }
        let flat: Vec<f64> = self.x.iter().flatten().map(|v| v.unwrap_or(f64::NAN)).collect();
        Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| GlmError::ShapeMismatch(e.to_string()))
    }

    pub fn counts(&self) -> Result<Array1<f64>> {
        let y = self
            .y
            .as_ref()
            .ok_or_else(|| GlmError::invalid_value("y", "dataset has no spike counts"))?;
        Ok(y.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.model.regularizer, Regularizer::Unregularized);
        assert_eq!(cfg.output.zstd_level, 3);
        assert_eq!(cfg.model.build().unwrap().solver_kind(), SolverKind::GradientDescent);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{"model": {"regularizer": {"type": "lasso", "regularizer_strength": 0.5}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.simulation.seed, 123);
        let model = cfg.model.build().unwrap();
        assert_eq!(model.solver_kind(), SolverKind::ProximalGradient);
    }

    #[test]
    fn test_overlapping_group_mask_fails_build() {
        let cfg: ModelConfig = serde_json::from_str(
            r#"{"regularizer": {"type": "group_lasso", "regularizer_strength": 0.1,
                "mask": {"v": 1, "dim": [2, 2], "data": [1.0, 1.0, 1.0, 0.0]}}}"#,
        )
        .unwrap();
        assert!(matches!(cfg.build(), Err(GlmError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_config_file_falls_back() {
        let cfg = Config::load(Path::new("/nonexistent/spikeglm.json")).unwrap();
        assert!(!cfg.output.compress);
    }

    #[test]
    fn test_compressed_model_path() {
        let out = OutputConfig {
            compress: true,
            zstd_level: 3,
        };
        assert_eq!(out.model_path(Path::new("m.json")), PathBuf::from("m.json.zst"));
        assert_eq!(out.model_path(Path::new("m.zst")), PathBuf::from("m.zst"));
    }

    #[test]
    fn test_dataset_nulls_become_nan() {
        let ds: Dataset = serde_json::from_str(r#"{"x": [[1.0, null], [2.0, 3.0]], "y": [1, null]}"#).unwrap();
        let x = ds.design().unwrap();
        assert!(x[[0, 1]].is_nan());
        assert!(ds.counts().unwrap()[1].is_nan());
    }

    #[test]
    fn test_ragged_dataset_rejected() {
        let ds: Dataset = serde_json::from_str(r#"{"x": [[1.0, 2.0], [3.0]]}"#).unwrap();
        assert!(matches!(ds.design(), Err(GlmError::ShapeMismatch(_))));
        assert!(ds.counts().is_err());
    }

    #[test]
    fn test_overrides_reach_nested_params() {
        let mut model = Glm::new(Regularizer::ridge(1.0));
        apply_overrides(
            &mut model,
            &[("regularizer__regularizer_strength".to_string(), "0.25".to_string())],
        )
        .unwrap();
        assert_eq!(model.regularizer().strength(), Some(0.25));
        assert!(parse_key_value("no-equals").is_err());
    }
}
