use anyhow::{bail, ensure, Context, Result};
use digitlens_core::{
    Backend, BackendModel, DType, ExecutionConfig, IOName, ModelSource, ModelSpec, NamedOutputs,
    Tensor, TensorSpec,
};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::{DynValue, ValueType},
};
use tracing::{debug, info};

pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    session: Session,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, source: &ModelSource, config: ExecutionConfig) -> Result<Self::Model> {
        let builder = Session::builder().context("failed to create ORT session builder")?;
        let builder = configure_session_builder(builder, config)?;

        let session = match source {
            ModelSource::File(path) => builder
                .commit_from_file(path)
                .with_context(|| format!("failed to load ONNX model from {}", path.display()))?,
            ModelSource::Url(url) => builder
                .commit_from_url(url)
                .with_context(|| format!("failed to fetch ONNX model from {url}"))?,
        };

        let spec = build_model_spec(&session)?;
        info!(
            source = %source,
            inputs = ?spec.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            outputs = ?spec.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            "ONNX session initialized"
        );

        Ok(OrtModel { spec, session })
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<(IOName, Tensor)>) -> Result<NamedOutputs> {
        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in inputs {
            ensure!(
                self.spec.inputs.iter().any(|spec| spec.name == name),
                "model has no input named `{name}`"
            );
            let value = tensor_to_ort_value(&input)?;
            ort_inputs.push((name.0, SessionInputValue::from(value)));
        }

        let outputs = self.session.run(ort_inputs)?;
        let mut named = NamedOutputs::new();
        for (name, value) in outputs.iter() {
            named.insert(name, ort_value_to_tensor(&value)?);
        }
        debug!(outputs = named.len(), "inference complete");

        Ok(named)
    }
}

fn build_model_spec(session: &Session) -> Result<ModelSpec> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
        .collect::<Result<Vec<_>>>()?;

    let outputs = session
        .outputs
        .iter()
        .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelSpec { inputs, outputs })
}

// WASM in the browser and the CPU provider here both run without GPU
// acceleration; the builder's default provider list is CPU only.
fn configure_session_builder(
    builder: SessionBuilder,
    config: ExecutionConfig,
) -> Result<SessionBuilder> {
    let level = if config.full_graph_optimization {
        GraphOptimizationLevel::Level3
    } else {
        GraphOptimizationLevel::Disable
    };
    let builder = builder
        .with_optimization_level(level)
        .context("failed to configure ORT graph optimization")?;

    match config.intra_threads {
        Some(threads) => builder
            .with_intra_threads(threads)
            .context("failed to configure ORT intra-op threads"),
        None => Ok(builder),
    }
}

fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("unsupported non-tensor IO value type for `{name}`");
    };

    let dims = shape
        .iter()
        .map(|d| if *d < 0 { None } else { Some(*d as usize) })
        .collect::<Vec<_>>();

    Ok(TensorSpec {
        name: IOName::new(name),
        dtype: ort_tensor_element_to_dtype(*ty),
        dims,
    })
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> DType {
    match ty {
        TensorElementType::Float32 => DType::F32,
        TensorElementType::Float16 => DType::F16,
        TensorElementType::Int64 => DType::I64,
        TensorElementType::Int32 => DType::I32,
        TensorElementType::Uint8 => DType::U8,
        _ => DType::Other,
    }
}

fn tensor_to_ort_value(tensor: &Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.dims().to_vec();
    let data = tensor.data().to_vec();
    Ok(ort::value::Tensor::from_array((shape, data))?.into_dyn())
}

fn ort_value_to_tensor(value: &ort::value::ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();

    let data = match *ty {
        TensorElementType::Float32 => {
            let array = value.try_extract_array::<f32>()?;
            array
                .as_slice()
                .context("non-contiguous output tensor")?
                .to_vec()
        }
        TensorElementType::Int64 => widen(value.try_extract_array::<i64>()?.as_slice(), |v| {
            v as f32
        })?,
        TensorElementType::Int32 => widen(value.try_extract_array::<i32>()?.as_slice(), |v| {
            v as f32
        })?,
        TensorElementType::Uint8 => {
            widen(value.try_extract_array::<u8>()?.as_slice(), f32::from)?
        }
        _ => bail!("unsupported output tensor element type: {ty}"),
    };

    Tensor::new(&dims, data).context("engine returned an inconsistent tensor")
}

fn widen<T: Copy>(slice: Option<&[T]>, f: impl Fn(T) -> f32) -> Result<Vec<f32>> {
    let slice = slice.context("non-contiguous output tensor")?;
    Ok(slice.iter().copied().map(f).collect())
}
