//! Classifier wrapper, inference backend and model files

pub mod classifier;
pub mod manager;
pub mod session;

pub use classifier::NudeNetClassifier;
pub use manager::ModelManager;
pub use session::{InferenceBackend, OrtBackend, OutputTensor};
