use std::path::PathBuf;

use digitlens_core::ExecutionConfig;

use crate::layers::ACTIVATION_LAYERS;
use crate::visualize::DEFAULT_MAX_CHANNELS;

pub const DEFAULT_MODEL_URL: &str = "/model.onnx";
pub const DEFAULT_ASSETS_DIR: &str = "public";
pub const INPUT_NAME: &str = "input";
pub const LOGITS_NAME: &str = "output";
pub const NUM_CLASSES: usize = 10;

/// Settings for one prediction pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub model_url: String,
    /// Directory that site-relative model URLs are served from.
    pub assets_dir: PathBuf,
    pub input_name: String,
    pub logits_name: String,
    pub num_classes: usize,
    /// Optional outputs collected into each result, in display order.
    pub activation_layers: Vec<String>,
    pub max_grid_channels: usize,
    pub execution: ExecutionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            input_name: INPUT_NAME.to_string(),
            logits_name: LOGITS_NAME.to_string(),
            num_classes: NUM_CLASSES,
            activation_layers: ACTIVATION_LAYERS.iter().map(|l| l.to_string()).collect(),
            max_grid_channels: DEFAULT_MAX_CHANNELS,
            execution: ExecutionConfig::default(),
        }
    }
}
