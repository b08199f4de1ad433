//! Known activation layers of the digit classifier and how to browse them.

use digitlens_core::{PipelineError, PipelineResult, RgbaSurface, Tensor};

use crate::visualize::{dimensions_of, render_channel};
use crate::PredictionResult;

/// Intermediate outputs the exported model may bind, in network order.
pub const ACTIVATION_LAYERS: &[&str] = &[
    "conv1",
    "conv1_bn",
    "conv1_act",
    "conv1_pool",
    "conv2",
    "conv2_bn",
    "conv2_act",
    "conv2_pool",
    "conv3",
    "conv3_bn",
    "conv3_act",
    "features_flat",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerGroup {
    pub name: &'static str,
    pub layers: &'static [&'static str],
}

/// Browsable layers. Batch-norm outputs are collected but not grouped.
pub const LAYER_GROUPS: &[LayerGroup] = &[
    LayerGroup {
        name: "Convolution Layer 1",
        layers: &["conv1", "conv1_act", "conv1_pool"],
    },
    LayerGroup {
        name: "Convolution Layer 2",
        layers: &["conv2", "conv2_act", "conv2_pool"],
    },
    LayerGroup {
        name: "Convolution Layer 3",
        layers: &["conv3", "conv3_act"],
    },
];

pub fn describe(layer: &str) -> &'static str {
    match layer {
        "conv1" => "First convolutional layer (16 filters, 3x3)",
        "conv1_act" => "ReLU activation after first conv layer",
        "conv1_pool" => "Max pooling after first conv (2x2)",
        "conv2" => "Second convolutional layer (32 filters, 3x3)",
        "conv2_act" => "ReLU activation after second conv layer",
        "conv2_pool" => "Max pooling after second conv (2x2)",
        "conv3" => "Third convolutional layer (64 filters, 3x3)",
        "conv3_act" => "ReLU activation after third conv layer",
        _ => "Layer visualization",
    }
}

/// `conv1_act` -> `conv1 act`
pub fn display_name(layer: &str) -> String {
    layer.replace('_', " ")
}

pub fn group_of(layer: &str) -> Option<&'static LayerGroup> {
    LAYER_GROUPS
        .iter()
        .find(|g| g.layers.iter().any(|l| *l == layer))
}

/// Cycles through the grouped layers a prediction actually produced.
#[derive(Clone, Debug)]
pub struct LayerNavigator {
    layers: Vec<&'static str>,
    current: usize,
}

impl LayerNavigator {
    /// `None` when the result holds none of the grouped layers.
    pub fn new(result: &PredictionResult) -> Option<Self> {
        let layers: Vec<&'static str> = LAYER_GROUPS
            .iter()
            .flat_map(|g| g.layers.iter().copied())
            .filter(|layer| result.activations.contains_key(*layer))
            .collect();
        if layers.is_empty() {
            return None;
        }
        Some(Self { layers, current: 0 })
    }

    pub fn available(&self) -> &[&'static str] {
        &self.layers
    }

    pub fn current(&self) -> &'static str {
        self.layers[self.current]
    }

    pub fn current_group(&self) -> Option<&'static LayerGroup> {
        group_of(self.current())
    }

    /// Moves to `layer` if it is available.
    pub fn select(&mut self, layer: &str) -> bool {
        match self.layers.iter().position(|l| *l == layer) {
            Some(i) => {
                self.current = i;
                true
            }
            None => false,
        }
    }

    /// Moves to the first available layer of the named group.
    pub fn select_group(&mut self, group: &str) -> bool {
        let Some(group) = LAYER_GROUPS.iter().find(|g| g.name == group) else {
            return false;
        };
        group.layers.iter().any(|layer| self.select(layer))
    }

    pub fn next(&mut self) -> &'static str {
        self.current = (self.current + 1) % self.layers.len();
        self.current()
    }

    pub fn prev(&mut self) -> &'static str {
        self.current = self
            .current
            .checked_sub(1)
            .unwrap_or(self.layers.len() - 1);
        self.current()
    }
}

/// A single channel of one layer, stepped through with wrap-around.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelCursor {
    layer: String,
    index: usize,
    total: usize,
}

impl ChannelCursor {
    pub fn open(result: &PredictionResult, layer: &str, index: usize) -> PipelineResult<Self> {
        let tensor = layer_tensor(result, layer)?;
        let total = dimensions_of(tensor).channels;
        if index >= total {
            return Err(PipelineError::InvalidChannelIndex {
                index,
                channels: total,
            });
        }
        Ok(Self {
            layer: layer.to_string(),
            index,
            total,
        })
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn next(&mut self) -> usize {
        self.index = if self.index + 1 == self.total {
            0
        } else {
            self.index + 1
        };
        self.index
    }

    pub fn prev(&mut self) -> usize {
        self.index = if self.index == 0 {
            self.total - 1
        } else {
            self.index - 1
        };
        self.index
    }

    pub fn title(&self) -> String {
        format!("{} - Channel {}", display_name(&self.layer), self.index)
    }

    /// Draws the current channel, including channels a grid left out.
    pub fn render(
        &self,
        result: &PredictionResult,
        surface: &mut RgbaSurface,
    ) -> PipelineResult<()> {
        render_channel(layer_tensor(result, &self.layer)?, surface, self.index)
    }
}

fn layer_tensor<'a>(result: &'a PredictionResult, layer: &str) -> PipelineResult<&'a Tensor> {
    result
        .activations
        .get(layer)
        .ok_or_else(|| PipelineError::MissingOutput(layer.to_string()))
}
