//! Shared fixtures for blind-eye integration tests

#![allow(dead_code)]

use blind_eye::{
    AnalyzerConfig, AnalyzerError, FrameAnalyzer, InferenceBackend, InputTensor,
    NudeNetClassifier, OutputTensor, RecordingGate,
};
use std::sync::mpsc::{Receiver, Sender};

pub const ROWS: usize = 22;

/// Backend returning the same output for every frame
pub struct FixedBackend {
    pub output: OutputTensor,
    pub seen_shapes: Option<Sender<[usize; 4]>>,
}

impl InferenceBackend for FixedBackend {
    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, AnalyzerError> {
        if let Some(tx) = &self.seen_shapes {
            let _ = tx.send(input.shape());
        }
        Ok(self.output.clone())
    }
}

/// Backend that reports each call and then blocks until released
pub struct BlockingBackend {
    pub output: OutputTensor,
    pub started: Sender<()>,
    pub release: Receiver<()>,
}

impl InferenceBackend for BlockingBackend {
    fn run(&mut self, _input: &InputTensor) -> Result<OutputTensor, AnalyzerError> {
        let _ = self.started.send(());
        self.release
            .recv()
            .map_err(|_| AnalyzerError::Model("release channel closed".to_string()))?;
        Ok(self.output.clone())
    }
}

/// Output tensor holding a single anchor: a box in model-input pixels and one class score
pub fn one_detection(cx: f32, cy: f32, w: f32, h: f32, class: usize, score: f32) -> OutputTensor {
    let mut data = vec![0.0f32; ROWS];
    data[0] = cx;
    data[1] = cy;
    data[2] = w;
    data[3] = h;
    data[4 + class] = score;
    OutputTensor::new(vec![1, ROWS, 1], data).unwrap()
}

/// Output tensor with no anchor above any threshold
pub fn empty_output() -> OutputTensor {
    OutputTensor::new(vec![1, ROWS, 4], vec![0.0; ROWS * 4]).unwrap()
}

pub fn test_config(input_size: u32, frame_stride: u32) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();
    config.input_size = input_size;
    config.frame_stride = frame_stride;
    config
}

pub fn analyzer(
    config: AnalyzerConfig,
    backend: impl InferenceBackend + 'static,
    gate: RecordingGate,
) -> FrameAnalyzer {
    FrameAnalyzer::new(config, NudeNetClassifier::new(Box::new(backend)), gate).unwrap()
}
