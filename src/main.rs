//! spikeglm: fit, score and simulate Poisson GLMs of spike counts from the
//! command line.
//!
//! Datasets and model files are JSON; see [`spikeglm::config`].

use std::path::Path;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use spikeglm::backend::{detect_devices, select_device, ComputeDevice};
use spikeglm::config::{apply_overrides, Cli, Command, Config, Dataset};
use spikeglm::persist::FittedModel;
use spikeglm::{Glm, Params, ScoreType};

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose { "spikeglm=debug" } else { "spikeglm=info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("spikeglm v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;

    if matches!(cli.command, Command::Devices) {
        let mut devices = vec![ComputeDevice::cpu()];
        devices.extend(detect_devices());
        for device in &devices {
            println!("{device}");
        }
        return Ok(());
    }

    let device = select_device(cli.prefer_gpu);
    info!(device = %device, "Compute device");

    match cli.command {
        Command::Fit {
            data,
            output,
            overrides,
        } => {
            let dataset = Dataset::load(&data)?;
            let x = dataset.design()?;
            let y = dataset.counts()?;

            let mut model = config.model.build()?;
            apply_overrides(&mut model, &overrides)?;
            info!(params = ?model.get_params(false), "Fitting");
            model.fit(x.view(), y.view(), None)?;

            let path = config.output.model_path(&output);
            FittedModel::from_glm(&model)?.save(&path, config.output.zstd_level)?;
        }
        Command::Predict { data, model, output } => {
            let model = load_model(&model)?;
            let x = Dataset::load(&data)?.design()?;
            let rates = model.predict(x.view())?;
            emit(output.as_deref(), &rates.to_vec())?;
        }
        Command::Score {
            data,
            model,
            score_type,
        } => {
            let model = load_model(&model)?;
            let dataset = Dataset::load(&data)?;
            let score_type: ScoreType = score_type.parse()?;
            let score = model.score(dataset.design()?.view(), dataset.counts()?.view(), score_type)?;
            println!("{score}");
        }
        Command::Simulate {
            data,
            model,
            output,
            seed,
        } => {
            let model = load_model(&model)?;
            let x = Dataset::load(&data)?.design()?;
            let seed = seed.unwrap_or(config.simulation.seed);
            let mut rng = StdRng::seed_from_u64(seed);
            let (counts, rates) = model.simulate(&mut rng, x.view())?;
            info!(seed, total_spikes = counts.sum(), "Simulated spike counts");

            #[derive(Serialize)]
            struct Simulated {
                counts: Vec<f64>,
                rates: Vec<f64>,
            }
            emit(
                output.as_deref(),
                &Simulated {
                    counts: counts.to_vec(),
                    rates: rates.to_vec(),
                },
            )?;
        }
        // Listed above.
        Command::Devices => {}
    }

    Ok(())
}

fn load_model(path: &Path) -> anyhow::Result<Glm> {
    let model = Glm::from_fitted(FittedModel::load(path)?)?;
    info!(path = %path.display(), solver = %model.solver_kind(), "Model loaded");
    Ok(model)
}

/// Write `value` as JSON to `output`, or to stdout.
fn emit<T: Serialize>(output: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
