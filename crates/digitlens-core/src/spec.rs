use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{PipelineError, PipelineResult, Tensor};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IOName(pub String);

impl IOName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
    Other,
}

#[derive(Clone, Debug)]
pub struct TensorSpec {
    pub name: IOName,
    pub dtype: DType,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelSpec {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl ModelSpec {
    pub fn output(&self, name: &str) -> Option<&TensorSpec> {
        self.outputs.iter().find(|o| o.name.as_str() == name)
    }
}

/// Every tensor bound by one inference call, keyed by output name.
#[derive(Clone, Debug, Default)]
pub struct NamedOutputs {
    tensors: BTreeMap<IOName, Tensor>,
}

impl NamedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(IOName(name.into()), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(&IOName::new(name))
    }

    /// Looks up an output the pipeline cannot work without.
    pub fn require(&self, name: &str) -> PipelineResult<&Tensor> {
        self.get(name)
            .ok_or_else(|| PipelineError::MissingOutput(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &IOName> {
        self.tensors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IOName, &Tensor)> {
        self.tensors.iter()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<(IOName, Tensor)> for NamedOutputs {
    fn from_iter<I: IntoIterator<Item = (IOName, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

/// Where a model artifact lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    Url(String),
    File(PathBuf),
}

impl ModelSource {
    /// Remote `http(s)` URLs are fetched as-is; anything else is a path served
    /// from `assets_dir`, so `/model.onnx` maps to `<assets_dir>/model.onnx`.
    pub fn resolve(model_url: &str, assets_dir: &Path) -> Self {
        if model_url.starts_with("http://") || model_url.starts_with("https://") {
            return Self::Url(model_url.to_string());
        }
        Self::File(assets_dir.join(model_url.trim_start_matches('/')))
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}
