use std::sync::Arc;

use digitlens_core::{Backend, IOName, NamedOutputs, PipelineError, PipelineResult, Tensor};
use tracing::{debug, warn};

use crate::preprocess::INPUT_DIMS;
use crate::SessionManager;

/// Feeds model inputs to the shared session and checks the result contract.
pub struct InferenceRunner<B: Backend> {
    sessions: Arc<SessionManager<B>>,
    model_url: String,
    input_name: String,
    logits_name: String,
}

impl<B: Backend> InferenceRunner<B> {
    pub fn new(
        sessions: Arc<SessionManager<B>>,
        model_url: impl Into<String>,
        input_name: impl Into<String>,
        logits_name: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            model_url: model_url.into(),
            input_name: input_name.into(),
            logits_name: logits_name.into(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager<B>> {
        &self.sessions
    }

    pub async fn ensure_ready(&self) -> bool {
        self.sessions.ensure_ready(&self.model_url).await
    }

    /// Runs one forward pass over a `[1, 1, 28, 28]` input.
    ///
    /// The returned outputs always contain the logits binding; every other
    /// binding is passed through untouched.
    pub async fn run(&self, input: Tensor) -> PipelineResult<NamedOutputs> {
        if input.dims() != INPUT_DIMS.as_slice() {
            return Err(PipelineError::UnexpectedShape {
                name: self.input_name.clone(),
                dims: input.dims().to_vec(),
                expected: format!("{INPUT_DIMS:?}"),
            });
        }

        let session = match self.sessions.session(&self.model_url).await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "inference requested without a ready session");
                return Err(PipelineError::SessionNotReady);
            }
        };

        let feeds = vec![(IOName::new(self.input_name.as_str()), input)];
        let outputs = tokio::task::spawn_blocking(move || session.infer(feeds))
            .await
            .map_err(|err| PipelineError::Engine(err.into()))?
            .map_err(PipelineError::Engine)?;

        outputs.require(&self.logits_name)?;
        debug!(
            outputs = ?outputs.names().map(IOName::as_str).collect::<Vec<_>>(),
            "inference complete"
        );
        Ok(outputs)
    }
}
