use anyhow::Result;

use crate::{IOName, ModelSource, ModelSpec, NamedOutputs, Tensor};

/// Fixed execution settings applied to every session a backend opens.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionConfig {
    /// Run every graph-level optimization the engine offers.
    pub full_graph_optimization: bool,
    /// Intra-op threads; `None` leaves the engine default.
    pub intra_threads: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            full_graph_optimization: true,
            intra_threads: None,
        }
    }
}

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, source: &ModelSource, config: ExecutionConfig) -> Result<Self::Model>;
}

pub trait BackendModel: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Runs one forward pass and returns every output the model binds.
    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>) -> Result<NamedOutputs>;
}
