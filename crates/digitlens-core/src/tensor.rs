use std::sync::Arc;

use smallvec::SmallVec;

use crate::{PipelineError, PipelineResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

/// Dense row-major `f32` tensor.
///
/// Storage is shared and never mutated after construction, so clones are
/// cheap and every holder sees the same values the engine produced.
#[derive(Clone, Debug)]
pub struct Tensor {
    shape: Shape,
    data: Arc<[f32]>,
}

impl Tensor {
    pub fn new(dims: &[usize], data: Vec<f32>) -> PipelineResult<Self> {
        let shape = Shape::from_slice(dims);
        let expected = shape.numel();
        if data.len() != expected {
            return Err(PipelineError::ShapeMismatch {
                dims: dims.to_vec(),
                len: data.len(),
                expected,
            });
        }
        Ok(Self {
            shape,
            data: data.into(),
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
