//! NudeNet detector wrapper

use crate::config::AnalyzerConfig;
use crate::detection::Label;
use crate::error::AnalyzerError;
use crate::models::session::{InferenceBackend, OrtBackend, OutputTensor};
use crate::preprocess::InputTensor;
use tracing::debug;

/// Box coordinates preceding the class scores in each output column
pub const BOX_ROWS: usize = 4;

/// Classifier producing `[1, 4 + labels, anchors]` output tensors
pub struct NudeNetClassifier {
    backend: Box<dyn InferenceBackend>,
}

impl NudeNetClassifier {
    /// Wrap an already loaded backend
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Load the ONNX model named by the configuration
    pub fn load(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let backend = OrtBackend::load(&config.model_path, config.num_threads)?;
        Ok(Self::new(Box::new(backend)))
    }

    /// Run one forward pass and check the output shape
    pub fn classify_image(&mut self, input: &InputTensor) -> Result<OutputTensor, AnalyzerError> {
        let output = self.backend.run(input)?;
        debug!("Model output shape: {:?}", output.shape());

        let rows = BOX_ROWS + Label::ALL.len();
        let valid = matches!(
            output.shape(),
            [1, r, anchors] if *r == rows && *anchors > 0
        );
        if !valid {
            return Err(AnalyzerError::Model(format!(
                "Unexpected output shape {:?}, expected [1, {}, N]",
                output.shape(), rows
            )));
        }
        Ok(output)
    }
}
