//! blind-eye: real-time explicit content analysis for camera frames
//!
//! Converts camera frames into normalised tensors, runs a pretrained NudeNet
//! detector through ONNX Runtime and flags frames that contain explicit
//! regions, so callers can blur or otherwise intervene.

pub mod analyzer;
pub mod config;
pub mod detection;
pub mod error;
pub mod executor;
pub mod frame;
pub mod models;
pub mod preprocess;

pub use analyzer::{FrameAnalyzer, FrameVerdict, LoggingSink, RecordingGate, VerdictSink};
pub use config::AnalyzerConfig;
pub use detection::{BoundingBox, Detection, Label};
pub use error::AnalyzerError;
pub use executor::{AnalysisExecutor, ExecutorStats, Submission};
pub use frame::{CameraFrame, ColorRange, Plane, Yuv420Frame};
pub use models::{InferenceBackend, ModelManager, NudeNetClassifier, OutputTensor};
pub use preprocess::{InputTensor, ResizeFilter, TensorLayout};
