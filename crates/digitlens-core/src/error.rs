use thiserror::Error;

/// Failures surfaced by the prediction and visualization pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("drawing surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("failed to load model session: {0}")]
    SessionLoadFailed(String),

    #[error("model session is not ready")]
    SessionNotReady,

    #[error("inference result is missing required output `{0}`")]
    MissingOutput(String),

    #[error("invalid channel index {index}, max is {}", .channels.saturating_sub(1))]
    InvalidChannelIndex { index: usize, channels: usize },

    #[error("tensor data has {len} values but dims {dims:?} need {expected}")]
    ShapeMismatch {
        dims: Vec<usize>,
        len: usize,
        expected: usize,
    },

    #[error("output `{name}` has dims {dims:?}, expected {expected}")]
    UnexpectedShape {
        name: String,
        dims: Vec<usize>,
        expected: String,
    },

    #[error("cannot visualize a rank-{0} tensor")]
    UnsupportedRank(usize),

    #[error("cannot classify an empty logits vector")]
    EmptyLogits,

    #[error("inference engine failed: {0:#}")]
    Engine(anyhow::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
