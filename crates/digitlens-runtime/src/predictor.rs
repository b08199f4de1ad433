use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use digitlens_core::{Backend, PipelineError, PipelineResult, RgbaSurface, Tensor};
use tracing::{debug, info};

use crate::postprocess::classify;
use crate::preprocess::preprocess;
use crate::{InferenceRunner, PipelineConfig, SessionManager};

/// Outcome of one successful prediction. A newer prediction replaces it
/// rather than changing it.
#[derive(Clone, Debug)]
pub struct PredictionResult {
    pub prediction: usize,
    pub probs: Vec<f32>,
    /// Collected activation layers, keyed by output name.
    pub activations: BTreeMap<String, Tensor>,
}

/// Identifies one issued prediction request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Monotonic request counter. Predictions may finish out of order; a result
/// is worth showing only if its ticket is still the latest one issued.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Canvas in, digit and activations out.
pub struct Predictor<B: Backend> {
    runner: InferenceRunner<B>,
    config: PipelineConfig,
    sequencer: RequestSequencer,
}

impl<B: Backend> Predictor<B> {
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(
            backend,
            config.assets_dir.clone(),
            config.execution,
        ));
        Self::with_sessions(sessions, config)
    }

    /// Shares an existing session manager, so several predictors reuse one
    /// loaded model.
    pub fn with_sessions(sessions: Arc<SessionManager<B>>, config: PipelineConfig) -> Self {
        let runner = InferenceRunner::new(
            sessions,
            config.model_url.clone(),
            config.input_name.clone(),
            config.logits_name.clone(),
        );
        Self {
            runner,
            config,
            sequencer: RequestSequencer::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager<B>> {
        self.runner.sessions()
    }

    pub fn sequencer(&self) -> &RequestSequencer {
        &self.sequencer
    }

    /// Starts loading the model ahead of the first prediction.
    pub async fn warm_up(&self) -> bool {
        self.runner.ensure_ready().await
    }

    pub async fn predict(&self, canvas: &RgbaSurface) -> PipelineResult<PredictionResult> {
        if !self.runner.ensure_ready().await {
            return Err(PipelineError::SessionNotReady);
        }

        let input = preprocess(canvas)?;
        let outputs = self.runner.run(input).await?;

        let logits = outputs.require(&self.config.logits_name)?;
        if logits.len() != self.config.num_classes {
            return Err(PipelineError::UnexpectedShape {
                name: self.config.logits_name.clone(),
                dims: logits.dims().to_vec(),
                expected: format!("{} class logits", self.config.num_classes),
            });
        }
        let classification = classify(logits.data())?;

        let activations: BTreeMap<String, Tensor> = self
            .config
            .activation_layers
            .iter()
            .filter_map(|layer| {
                outputs
                    .get(layer)
                    .map(|tensor| (layer.clone(), tensor.clone()))
            })
            .collect();
        debug!(
            collected = activations.len(),
            expected = self.config.activation_layers.len(),
            "collected activations"
        );

        info!(
            prediction = classification.prediction,
            confidence = classification.probs[classification.prediction],
            "digit classified"
        );
        Ok(PredictionResult {
            prediction: classification.prediction,
            probs: classification.probs,
            activations,
        })
    }

    /// Like [`Predictor::predict`], but yields `None` when another request was
    /// issued while this one was running. A superseded request never reports
    /// its error either.
    pub async fn predict_tracked(
        &self,
        canvas: &RgbaSurface,
    ) -> PipelineResult<Option<PredictionResult>> {
        let ticket = self.sequencer.issue();
        let outcome = self.predict(canvas).await;
        if !self.sequencer.is_current(ticket) {
            match &outcome {
                Ok(_) => debug!(?ticket, "discarding stale prediction"),
                Err(err) => debug!(?ticket, error = %err, "discarding stale failed prediction"),
            }
            return Ok(None);
        }
        outcome.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_ticket_is_current() {
        let seq = RequestSequencer::new();
        let first = seq.issue();
        assert!(seq.is_current(first));
        let second = seq.issue();
        assert!(second > first);
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }
}
