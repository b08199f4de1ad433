use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use digitlens_core::{
    Backend, BackendModel, ExecutionConfig, IOName, ModelSource, ModelSpec, NamedOutputs,
    PipelineError, PipelineResult, Tensor,
};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// A model that finished loading. Lives for the rest of the process.
pub struct LoadedSession<M> {
    source: ModelSource,
    spec: ModelSpec,
    model: Mutex<M>,
}

impl<M: BackendModel> LoadedSession<M> {
    fn new(model: M, source: ModelSource) -> Self {
        Self {
            source,
            spec: model.spec().clone(),
            model: Mutex::new(model),
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Blocking forward pass. The engine handle is held only for the call.
    pub fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> Result<NamedOutputs> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.infer(inputs)
    }
}

type LoadOutcome<M> = std::result::Result<Arc<LoadedSession<M>>, String>;

enum SessionState<M> {
    Uninitialized,
    Loading(watch::Receiver<Option<LoadOutcome<M>>>),
    Ready(Arc<LoadedSession<M>>),
}

/// Lazily loads one model and hands the same session to every caller.
///
/// The first caller starts the load; callers arriving while it is in flight
/// subscribe to the same outcome instead of starting another. A successful
/// load is kept forever. A failed one is dropped so the next call retries.
pub struct SessionManager<B: Backend> {
    backend: Arc<B>,
    assets_dir: PathBuf,
    execution: ExecutionConfig,
    state: Arc<Mutex<SessionState<B::Model>>>,
    load_attempts: AtomicUsize,
}

impl<B: Backend> SessionManager<B> {
    pub fn new(backend: B, assets_dir: impl Into<PathBuf>, execution: ExecutionConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            assets_dir: assets_dir.into(),
            execution,
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// Returns whether a session is available, loading it on first use.
    /// Load failures are logged by the loader; here they just read `false`.
    pub async fn ensure_ready(&self, model_url: &str) -> bool {
        self.session(model_url).await.is_ok()
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*lock_state(&self.state), SessionState::Ready(_))
    }

    /// How many loads have been started, successful or not.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub async fn session(&self, model_url: &str) -> PipelineResult<Arc<LoadedSession<B::Model>>> {
        let mut rx = {
            let mut state = lock_state(&self.state);
            match &*state {
                SessionState::Ready(session) => {
                    if *session.source() != self.resolve(model_url) {
                        debug!(
                            requested = model_url,
                            loaded = %session.source(),
                            "session already loaded, ignoring model url"
                        );
                    }
                    return Ok(session.clone());
                }
                SessionState::Loading(rx) => rx.clone(),
                SessionState::Uninitialized => {
                    let (tx, rx) = watch::channel(None);
                    *state = SessionState::Loading(rx.clone());
                    self.spawn_load(self.resolve(model_url), tx);
                    rx
                }
            }
        };

        let waited = rx
            .wait_for(Option::is_some)
            .await
            .map(|outcome| (*outcome).clone());
        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(_) => {
                // Loader vanished without reporting; free the slot for a retry.
                let mut state = lock_state(&self.state);
                if let SessionState::Loading(current) = &*state {
                    if current.same_channel(&rx) {
                        *state = SessionState::Uninitialized;
                    }
                }
                Some(Err("model load ended without a result".to_string()))
            }
        };

        match outcome {
            Some(Ok(session)) => Ok(session),
            Some(Err(reason)) => Err(PipelineError::SessionLoadFailed(reason)),
            None => Err(PipelineError::SessionNotReady),
        }
    }

    fn resolve(&self, model_url: &str) -> ModelSource {
        ModelSource::resolve(model_url, &self.assets_dir)
    }

    fn spawn_load(&self, source: ModelSource, tx: watch::Sender<Option<LoadOutcome<B::Model>>>) {
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let backend = self.backend.clone();
        let state = self.state.clone();
        let execution = self.execution;

        info!(source = %source, backend = backend.name(), attempt, "initializing model session");
        tokio::spawn(async move {
            let load_source = source.clone();
            let loaded =
                tokio::task::spawn_blocking(move || backend.load(&load_source, execution)).await;

            let outcome: LoadOutcome<B::Model> = match loaded {
                Ok(Ok(model)) => Ok(Arc::new(LoadedSession::new(model, source))),
                Ok(Err(err)) => Err(format!("{err:#}")),
                Err(err) => Err(format!("model load task failed: {err}")),
            };

            {
                let mut state = lock_state(&state);
                *state = match &outcome {
                    Ok(session) => SessionState::Ready(session.clone()),
                    Err(_) => SessionState::Uninitialized,
                };
            }

            match &outcome {
                Ok(session) => info!(source = %session.source(), attempt, "model session ready"),
                Err(reason) => error!(attempt, error = %reason, "failed to initialize model session"),
            }
            let _ = tx.send(Some(outcome));
        });
    }
}

fn lock_state<M>(state: &Mutex<SessionState<M>>) -> MutexGuard<'_, SessionState<M>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
