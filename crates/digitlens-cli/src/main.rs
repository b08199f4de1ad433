mod cli;
mod export;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, ModelArgs};
use digitlens_backend_ort::OrtBackend;
use digitlens_core::{RgbaSurface, TensorSpec};
use digitlens_runtime::layers::describe;
use digitlens_runtime::postprocess::percentages;
use digitlens_runtime::visualize::{dimensions_of, dimensions_text, Dimensions};
use digitlens_runtime::{PredictionResult, Predictor, SessionManager};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Predict {
            model,
            canvas,
            width,
            height,
            json,
            dump_dir,
            max_channels,
        } => {
            predict(
                model,
                &canvas,
                width,
                height,
                json,
                dump_dir,
                max_channels,
            )
            .await
        }
        Command::Inspect { model } => inspect(model).await,
    }
}

async fn predict(
    model: ModelArgs,
    canvas: &Path,
    width: usize,
    height: usize,
    json: bool,
    dump_dir: Option<PathBuf>,
    max_channels: usize,
) -> Result<()> {
    let pixels =
        std::fs::read(canvas).with_context(|| format!("failed to read {}", canvas.display()))?;
    let surface = RgbaSurface::from_rgba(width, height, pixels)?;

    let mut config = model.into_config();
    config.max_grid_channels = max_channels;
    let predictor = Predictor::new(OrtBackend::new(), config);

    let result = match predictor.predict(&surface).await {
        Ok(result) => result,
        Err(err) => {
            println!("no prediction yet");
            return Err(err).context("prediction failed");
        }
    };

    if json {
        let summary = PredictionSummary::new(&result);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&result);
    }

    if let Some(dir) = dump_dir {
        let max_channels = predictor.config().max_grid_channels;
        let written = export::write_layer_grids(&dir, &result, max_channels)?;
        tracing::info!(files = written.len(), dir = %dir.display(), "activation images written");
    }
    Ok(())
}

async fn inspect(model: ModelArgs) -> Result<()> {
    let config = model.into_config();
    let sessions = SessionManager::new(OrtBackend::new(), config.assets_dir, config.execution);
    let session = sessions
        .session(&config.model_url)
        .await
        .with_context(|| format!("failed to load {}", config.model_url))?;

    println!("model: {}", session.source());
    for input in &session.spec().inputs {
        println!("  in   {}", binding_line(input));
    }
    for output in &session.spec().outputs {
        let role = if output.name.as_str() == config.logits_name {
            "logits"
        } else if config.activation_layers.iter().any(|l| l == output.name.as_str()) {
            describe(output.name.as_str())
        } else {
            "ignored"
        };
        println!("  out  {}  ({role})", binding_line(output));
    }

    if session.spec().output(&config.logits_name).is_none() {
        tracing::warn!(name = %config.logits_name, "model has no logits output");
    }
    Ok(())
}

fn binding_line(spec: &TensorSpec) -> String {
    let dims: Vec<String> = spec
        .dims
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
        .collect();
    format!("{} {:?} [{}]", spec.name, spec.dtype, dims.join(", "))
}

fn print_report(result: &PredictionResult) {
    println!("prediction: {}", result.prediction);
    for (digit, pct) in percentages(&result.probs).into_iter().enumerate() {
        let marker = if digit == result.prediction { '>' } else { ' ' };
        let bar = "#".repeat((pct / 5) as usize);
        println!("{marker} {digit} {pct:>3}% {bar}");
    }
    for (layer, tensor) in &result.activations {
        println!("{layer}: {} ({})", dimensions_text(tensor), describe(layer));
    }
}

#[derive(Serialize)]
struct PredictionSummary<'a> {
    prediction: usize,
    probs: &'a [f32],
    percentages: Vec<u32>,
    activations: Vec<ActivationSummary<'a>>,
}

#[derive(Serialize)]
struct ActivationSummary<'a> {
    layer: &'a str,
    description: &'static str,
    dims: &'a [usize],
    dimensions: Dimensions,
}

impl<'a> PredictionSummary<'a> {
    fn new(result: &'a PredictionResult) -> Self {
        Self {
            prediction: result.prediction,
            probs: &result.probs,
            percentages: percentages(&result.probs),
            activations: result
                .activations
                .iter()
                .map(|(layer, tensor)| ActivationSummary {
                    layer,
                    description: describe(layer),
                    dims: tensor.dims(),
                    dimensions: dimensions_of(tensor),
                })
                .collect(),
        }
    }
}
