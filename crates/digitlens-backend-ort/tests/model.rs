use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use digitlens_backend_ort::OrtBackend;
use digitlens_core::{Backend, BackendModel, DType, ExecutionConfig, IOName, ModelSource, Tensor};

#[test]
fn missing_model_file_names_the_path() {
    let source = ModelSource::File(PathBuf::from("no/such/dir/model.onnx"));
    let err = match OrtBackend::new().load(&source, ExecutionConfig::default()) {
        Ok(_) => panic!("loading a missing file must fail"),
        Err(err) => err,
    };
    let message = format!("{err:#}");
    assert!(message.contains("no/such/dir/model.onnx"), "{message}");
}

/// Runs against the exported digit classifier when it has been placed in
/// `public/`; skipped otherwise.
#[test]
fn digit_model_contract() -> Result<()> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../public/model.onnx");
    if !path.exists() {
        eprintln!("skipping: {} not found", path.display());
        return Ok(());
    }

    let mut model = OrtBackend::new().load(&ModelSource::File(path), ExecutionConfig::default())?;
    let input = model
        .spec()
        .inputs
        .iter()
        .find(|spec| spec.name.as_str() == "input")
        .context("model has no `input` binding")?;
    ensure!(input.dtype == DType::F32, "expected f32 input");
    ensure!(
        model.spec().output("output").is_some(),
        "model has no `output` binding"
    );

    let blank = Tensor::new(&[1, 1, 28, 28], vec![0.0; 784])?;
    let outputs = model.infer(vec![(IOName::new("input"), blank)])?;
    let logits = outputs.require("output")?;
    assert_eq!(logits.len(), 10);
    ensure!(logits.data().iter().all(|v| v.is_finite()));
    Ok(())
}
