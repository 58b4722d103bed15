//! Error types for blind-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Preprocessing error: {0}")]
    Preprocess(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}
