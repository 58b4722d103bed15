//! Configuration for blind-eye

use crate::error::AnalyzerError;
use crate::frame::ColorRange;
use crate::preprocess::{ResizeFilter, TensorLayout};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the bundled NudeNet detector.
pub const DEFAULT_MODEL_FILE: &str = "640m.onnx";

/// Release asset the model manager downloads when no local copy exists.
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/notAI-tech/NudeNet/releases/download/v3.4-weights/640m.onnx";

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Path of the ONNX detector
    pub model_path: PathBuf,
    /// Where to fetch the model from when it is missing
    pub model_url: String,
    /// Optional SHA-256 of the model file (hex)
    pub model_checksum: Option<String>,
    /// Square side of the model input, in pixels
    pub input_size: u32,
    /// Intra-op threads handed to ONNX Runtime
    pub num_threads: usize,
    /// Memory layout the model expects for its image input
    pub tensor_layout: TensorLayout,
    /// Filter used when scaling frames to `input_size`
    pub resize_filter: ResizeFilter,
    /// Luma/chroma range of incoming YUV frames
    pub color_range: ColorRange,
    /// Minimum class score for a candidate box to survive decoding
    pub score_threshold: f32,
    /// Minimum confidence of an explicit detection for a frame to be flagged
    pub confidence_threshold: f32,
    /// IoU above which overlapping boxes of the same label are suppressed
    pub nms_iou_threshold: f32,
    /// Analyse one of every `frame_stride` frames while recording
    pub frame_stride: u32,
    /// Log filter directive used by the binary
    pub log_level: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_dir().join(DEFAULT_MODEL_FILE),
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_checksum: None,
            input_size: 640,
            num_threads: 4,
            tensor_layout: TensorLayout::Nchw,
            resize_filter: ResizeFilter::Triangle,
            color_range: ColorRange::Full,
            score_threshold: 0.25,
            confidence_threshold: 0.5,
            nms_iou_threshold: 0.45,
            frame_stride: 3,
            log_level: "info".to_string(),
        }
    }
}

/// `~/.blind/models`, or `./models` when there is no home directory.
pub fn default_model_dir() -> PathBuf {
    dirs::home_dir()
        .map(|mut p| {
            p.push(".blind");
            p.push("models");
            p
        })
        .unwrap_or_else(|| PathBuf::from("./models"))
}

impl AnalyzerConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalyzerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration, trying JSON, then TOML, then YAML
    pub fn from_str(content: &str) -> Result<Self, AnalyzerError> {
        if let Ok(config) = serde_json::from_str::<AnalyzerConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<AnalyzerConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<AnalyzerConfig>(content) {
            return Ok(config);
        }

        Err(AnalyzerError::Config("Unknown configuration format".to_string()))
    }

    /// Defaults overridden by `BLIND_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `BLIND_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override fields from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("BLIND_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }

        if let Some(threshold) = lookup("BLIND_CONFIDENCE_THRESHOLD") {
            if let Ok(t) = threshold.parse::<f32>() {
                self.confidence_threshold = t;
            }
        }

        if let Some(stride) = lookup("BLIND_FRAME_STRIDE") {
            if let Ok(s) = stride.parse::<u32>() {
                self.frame_stride = s;
            }
        }

        if let Some(threads) = lookup("BLIND_NUM_THREADS") {
            if let Ok(n) = threads.parse::<usize>() {
                self.num_threads = n;
            }
        }

        if let Some(level) = lookup("BLIND_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 || self.input_size > 4096 {
            return Err("Input size must be between 1 and 4096".to_string());
        }

        if self.num_threads == 0 || self.num_threads > 256 {
            return Err("Thread count must be between 1 and 256".to_string());
        }

        if self.frame_stride == 0 {
            return Err("Frame stride must be at least 1".to_string());
        }

        for (name, value) in [
            ("score_threshold", self.score_threshold),
            ("confidence_threshold", self.confidence_threshold),
            ("nms_iou_threshold", self.nms_iou_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1], got {}", name, value));
            }
        }

        if self.model_path.as_os_str().is_empty() {
            return Err("Model path must not be empty".to_string());
        }

        if let Some(checksum) = &self.model_checksum {
            if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("Model checksum must be 64 hex characters".to_string());
            }
        }

        Ok(())
    }
}
