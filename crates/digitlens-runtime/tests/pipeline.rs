use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use digitlens_core::{
    Backend, BackendModel, ExecutionConfig, IOName, ModelSource, ModelSpec, NamedOutputs,
    PipelineError, RgbaSurface, Tensor, OPAQUE_BLACK,
};
use digitlens_runtime::layers::{ChannelCursor, LayerNavigator};
use digitlens_runtime::visualize::{render_grid, FeatureGrid, GridItem};
use digitlens_runtime::{InferenceRunner, PipelineConfig, Predictor, SessionManager};
use tokio::task::JoinSet;

const DOMINANT_ZERO: [f32; 10] = [5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

#[derive(Clone)]
struct MockBackend {
    loads: Arc<AtomicUsize>,
    failing_loads: usize,
    load_delay: Duration,
    infer_delay: Duration,
    logits: Vec<f32>,
    emit_logits: bool,
    fail_blank_input: bool,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            failing_loads: 0,
            load_delay: Duration::ZERO,
            infer_delay: Duration::ZERO,
            logits: DOMINANT_ZERO.to_vec(),
            emit_logits: true,
            fail_blank_input: false,
        }
    }
}

struct MockModel {
    spec: ModelSpec,
    delay: Duration,
    logits: Vec<f32>,
    emit_logits: bool,
    fail_blank_input: bool,
}

impl Backend for MockBackend {
    type Model = MockModel;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn load(&self, _source: &ModelSource, _config: ExecutionConfig) -> Result<Self::Model> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        if attempt < self.failing_loads {
            bail!("model file is corrupt");
        }
        Ok(MockModel {
            spec: ModelSpec::default(),
            delay: self.infer_delay,
            logits: self.logits.clone(),
            emit_logits: self.emit_logits,
            fail_blank_input: self.fail_blank_input,
        })
    }
}

impl BackendModel for MockModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>) -> Result<NamedOutputs> {
        std::thread::sleep(self.delay);
        let (name, input) = inputs.first().context("no input bound")?;
        ensure!(name.as_str() == "input", "unexpected input binding {name}");
        ensure!(input.dims() == [1, 1, 28, 28], "unexpected input dims");
        if self.fail_blank_input && input.data().iter().all(|&v| v == 0.0) {
            bail!("transient engine failure");
        }

        let mut outputs = NamedOutputs::new();
        if self.emit_logits {
            outputs.insert(
                "output",
                Tensor::new(&[1, self.logits.len()], self.logits.clone())?,
            );
        }
        outputs.insert(
            "conv1",
            Tensor::new(&[1, 20, 3, 3], (0..180).map(|i| i as f32).collect())?,
        );
        outputs.insert(
            "features_flat",
            Tensor::new(&[1, 300], (0..300).map(|i| i as f32).collect())?,
        );
        outputs.insert("debug_probe", Tensor::new(&[1, 2], vec![0.0, 1.0])?);
        Ok(outputs)
    }
}

fn blank_canvas() -> RgbaSurface {
    let mut canvas = RgbaSurface::new(280, 280).expect("canvas");
    canvas.fill(OPAQUE_BLACK);
    canvas
}

fn manager(backend: MockBackend) -> Arc<SessionManager<MockBackend>> {
    Arc::new(SessionManager::new(backend, "public", ExecutionConfig::default()))
}

#[tokio::test]
async fn end_to_end_prediction() -> Result<()> {
    let predictor = Predictor::new(MockBackend::new(), PipelineConfig::default());
    let result = predictor.predict(&blank_canvas()).await?;

    assert_eq!(result.prediction, 0);
    assert_eq!(result.probs.len(), 10);
    ensure!(result.probs[1..].iter().all(|&p| p < result.probs[0]));
    ensure!((result.probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);

    let layers: Vec<&str> = result.activations.keys().map(String::as_str).collect();
    assert_eq!(layers, vec!["conv1", "features_flat"]);

    let mut grid = FeatureGrid::new();
    render_grid(&result.activations["conv1"], &mut grid, 16)?;
    assert_eq!(grid.channels().count(), 16);
    assert_eq!(grid.omitted(), 4);
    ensure!(matches!(
        grid.items().last(),
        Some(GridItem::Overflow { label, .. }) if label == "+4 more channels"
    ));

    let nav = LayerNavigator::new(&result).context("conv1 is browsable")?;
    assert_eq!(nav.current(), "conv1");
    let mut cursor = ChannelCursor::open(&result, "conv1", 0)?;
    cursor.prev();
    let mut surface = RgbaSurface::new(1, 1)?;
    cursor.render(&result, &mut surface)?;
    assert_eq!(cursor.index(), 19);
    assert_eq!((surface.width(), surface.height()), (3, 3));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_callers_share_one_load() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.load_delay = Duration::from_millis(100);
    let loads = backend.loads.clone();
    let sessions = manager(backend);

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let sessions = sessions.clone();
        set.spawn(async move { sessions.ensure_ready("/model.onnx").await });
    }
    while let Some(ready) = set.join_next().await {
        ensure!(ready?, "every caller should see the loaded session");
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(sessions.load_attempts(), 1);
    ensure!(sessions.is_ready());

    // Cached: no further loads.
    ensure!(sessions.ensure_ready("/model.onnx").await);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_observe_the_same_failure() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.failing_loads = 1;
    backend.load_delay = Duration::from_millis(100);
    let loads = backend.loads.clone();
    let sessions = manager(backend);

    let mut set = JoinSet::new();
    for _ in 0..4 {
        let sessions = sessions.clone();
        set.spawn(async move { sessions.ensure_ready("/model.onnx").await });
    }
    while let Some(ready) = set.join_next().await {
        ensure!(!ready?, "the shared load failed");
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn failed_load_is_discarded_and_retried() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.failing_loads = 1;
    let loads = backend.loads.clone();
    let sessions = manager(backend);

    match sessions.session("/model.onnx").await {
        Err(PipelineError::SessionLoadFailed(reason)) => {
            ensure!(reason.contains("corrupt"), "reason was {reason}")
        }
        Err(other) => bail!("unexpected error {other}"),
        Ok(_) => bail!("first load should fail"),
    }
    ensure!(!sessions.is_ready());

    ensure!(sessions.ensure_ready("/model.onnx").await);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn prediction_without_session_is_not_ready() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.failing_loads = usize::MAX;
    let predictor = Predictor::new(backend, PipelineConfig::default());

    let err = predictor.predict(&blank_canvas()).await.unwrap_err();
    ensure!(matches!(err, PipelineError::SessionNotReady), "got {err}");
    Ok(())
}

#[tokio::test]
async fn missing_logits_is_a_contract_error() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.emit_logits = false;
    let runner = InferenceRunner::new(manager(backend), "/model.onnx", "input", "output");

    let input = Tensor::new(&[1, 1, 28, 28], vec![0.0; 784])?;
    let err = runner.run(input).await.unwrap_err();
    ensure!(
        matches!(&err, PipelineError::MissingOutput(name) if name == "output"),
        "got {err}"
    );
    Ok(())
}

#[tokio::test]
async fn runner_rejects_misshapen_input() -> Result<()> {
    let runner = InferenceRunner::new(
        manager(MockBackend::new()),
        "/model.onnx",
        "input",
        "output",
    );
    let input = Tensor::new(&[1, 784], vec![0.0; 784])?;
    let err = runner.run(input).await.unwrap_err();
    ensure!(matches!(err, PipelineError::UnexpectedShape { .. }), "got {err}");
    Ok(())
}

#[tokio::test]
async fn wrong_class_count_is_rejected() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.logits = vec![1.0, 2.0, 3.0];
    let predictor = Predictor::new(backend, PipelineConfig::default());

    let err = predictor.predict(&blank_canvas()).await.unwrap_err();
    ensure!(matches!(err, PipelineError::UnexpectedShape { .. }), "got {err}");
    Ok(())
}

#[tokio::test]
async fn stale_results_are_discarded() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.infer_delay = Duration::from_millis(50);
    let predictor = Predictor::new(backend, PipelineConfig::default());
    ensure!(predictor.warm_up().await);

    let canvas = blank_canvas();
    let (older, newer) = tokio::join!(
        predictor.predict_tracked(&canvas),
        predictor.predict_tracked(&canvas)
    );
    ensure!(older?.is_none(), "superseded result must be dropped");
    let newer = newer?.context("latest result is kept")?;
    assert_eq!(newer.prediction, 0);
    Ok(())
}

#[tokio::test]
async fn superseded_failure_is_discarded() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.infer_delay = Duration::from_millis(30);
    backend.fail_blank_input = true;
    let predictor = Predictor::new(backend, PipelineConfig::default());
    ensure!(predictor.warm_up().await);

    let blank = blank_canvas();
    let mut drawn = blank_canvas();
    drawn.fill_rect(100, 40, 80, 200, [255, 255, 255, 255]);

    let (older, newer) = tokio::join!(
        predictor.predict_tracked(&blank),
        predictor.predict_tracked(&drawn)
    );
    ensure!(
        matches!(older, Ok(None)),
        "superseded failure must be dropped, got {older:?}"
    );
    let newer = newer?.context("latest result is kept")?;
    assert_eq!(newer.prediction, 0);
    Ok(())
}

#[tokio::test]
async fn current_failure_is_still_reported() -> Result<()> {
    let mut backend = MockBackend::new();
    backend.fail_blank_input = true;
    let predictor = Predictor::new(backend, PipelineConfig::default());

    let err = predictor.predict_tracked(&blank_canvas()).await.unwrap_err();
    ensure!(matches!(err, PipelineError::Engine(_)), "got {err}");
    Ok(())
}
