use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use digitlens_core::ExecutionConfig;
use digitlens_runtime::visualize::DEFAULT_MAX_CHANNELS;
use digitlens_runtime::{PipelineConfig, DEFAULT_ASSETS_DIR, DEFAULT_MODEL_URL};

#[derive(Parser, Debug)]
#[command(name = "digitlens", version, about = "Handwritten digit classifier inspector")]
pub struct Cli {
    /// Log filter, used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a canvas dump and optionally write its activation images
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        /// Raw RGBA8 canvas pixels, row-major
        #[arg(long)]
        canvas: PathBuf,

        /// Canvas width in pixels
        #[arg(long, default_value_t = 280)]
        width: usize,

        /// Canvas height in pixels
        #[arg(long, default_value_t = 280)]
        height: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Write each layer's channel images (PAM) under this directory
        #[arg(long)]
        dump_dir: Option<PathBuf>,

        /// Channels rendered per layer before the rest are summarized
        #[arg(long, default_value_t = DEFAULT_MAX_CHANNELS)]
        max_channels: usize,
    },

    /// Load the model and list its input and output bindings
    Inspect {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Model location; non-http paths resolve under --assets-dir
    #[arg(long, default_value = DEFAULT_MODEL_URL)]
    pub model_url: String,

    /// Directory site-relative model URLs are served from
    #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
    pub assets_dir: PathBuf,

    /// Intra-op threads for the inference engine
    #[arg(long)]
    pub threads: Option<usize>,
}

impl ModelArgs {
    pub fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            model_url: self.model_url,
            assets_dir: self.assets_dir,
            execution: ExecutionConfig {
                intra_threads: self.threads,
                ..ExecutionConfig::default()
            },
            ..PipelineConfig::default()
        }
    }
}
