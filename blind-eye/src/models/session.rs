//! ONNX Runtime inference backend

use crate::error::AnalyzerError;
use crate::preprocess::InputTensor;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw model output, copied out of the runtime.
///
/// Only built through [`OutputTensor::new`], so `data` always holds exactly
/// `shape.iter().product()` values.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, AnalyzerError> {
        let expected = shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim));
        if expected != Some(data.len()) {
            return Err(AnalyzerError::Model(format!(
                "Output shape {:?} does not match {} values",
                shape,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// A single forward pass through a pretrained network.
#[cfg_attr(test, mockall::automock)]
pub trait InferenceBackend: Send {
    /// Run the model on one input tensor and return its first output
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, AnalyzerError>;
}

/// ONNX Runtime session wrapper
pub struct OrtBackend {
    session: Session,
    input_name: String,
    model_path: PathBuf,
}

impl OrtBackend {
    /// Load a model file with `num_threads` intra-op threads
    pub fn load(model_path: &Path, num_threads: usize) -> Result<Self, AnalyzerError> {
        if !model_path.is_file() {
            return Err(AnalyzerError::Model(format!(
                "Model file {} not found",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| AnalyzerError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(num_threads)
            .map_err(|e| AnalyzerError::Ort(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| AnalyzerError::Ort(format!("Failed to load model: {}", e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| AnalyzerError::Model("Model declares no inputs".to_string()))?;

        info!(
            "Model loaded from {:?} (input '{}', {} threads)",
            model_path, input_name, num_threads
        );

        Ok(Self {
            session,
            input_name,
            model_path: model_path.to_path_buf(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl InferenceBackend for OrtBackend {
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, AnalyzerError> {
        debug!("Input tensor shape: {:?}", input.shape());

        let tensor = Tensor::from_array((input.shape(), input.data().to_vec().into_boxed_slice()))
            .map_err(|e| AnalyzerError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| AnalyzerError::Ort(format!("Inference failed: {}", e)))?;

        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| AnalyzerError::Model("Model produced no outputs".to_string()))?;

        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::Ort(format!("Failed to extract output tensor: {}", e)))?;

        let shape: Vec<usize> = shape.iter().map(|&dim| dim.max(0) as usize).collect();
        debug!("Output tensor shape: {:?}", shape);

        OutputTensor::new(shape, data.to_vec())
    }
}
