//! Model manager with auto-download functionality

use crate::config::AnalyzerConfig;
use crate::error::AnalyzerError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_MODEL_SIZE: usize = 2_000_000_000; // 2GB max
const MIN_MODEL_SIZE: usize = 1024;
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Resolves the detector file, downloading it when missing
pub struct ModelManager {
    config: Arc<AnalyzerConfig>,
}

impl ModelManager {
    /// Create a new model manager
    pub fn new(config: Arc<AnalyzerConfig>) -> Self {
        Self { config }
    }

    /// Directory holding the configured model file
    pub fn model_dir(&self) -> PathBuf {
        match self.config.model_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Ensure model directory exists
    pub fn ensure_model_dir(&self) -> Result<PathBuf, AnalyzerError> {
        let model_dir = self.model_dir();
        if !model_dir.exists() {
            fs::create_dir_all(&model_dir)?;
            info!("Created model directory: {:?}", model_dir);
        }
        Ok(model_dir)
    }

    /// Return the configured model, downloading it from `model_url` if needed
    pub async fn ensure_default_model(&self) -> Result<PathBuf, AnalyzerError> {
        let name = self
            .config
            .model_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AnalyzerError::Model("Model path has no file name".to_string()))?
            .to_string();
        let checksum = self.config.model_checksum.clone().unwrap_or_default();
        self.ensure_model(&name, &self.config.model_url, &checksum).await
    }

    /// Download model if not present
    pub async fn ensure_model(
        &self,
        model_name: &str,
        url: &str,
        checksum: &str,
    ) -> Result<PathBuf, AnalyzerError> {
        validate_model_name(model_name)?;
        validate_url(url)?;

        let model_dir = self.ensure_model_dir()?;
        let model_path = model_dir.join(model_name);

        if model_path.exists() {
            if !checksum.is_empty() {
                let bytes = fs::read(&model_path)?;
                verify_checksum(model_name, &bytes, checksum)?;
            }
            info!("Model {} already exists at {:?}", model_name, model_path);
            return Ok(model_path);
        }

        info!("Downloading model {} from {}", model_name, url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;

        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AnalyzerError::Model(format!(
                "Failed to download model: HTTP {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_MODEL_SIZE as u64 {
                return Err(AnalyzerError::Model(format!(
                    "Model too large: {} bytes (max {} bytes)",
                    content_length, MAX_MODEL_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;
        check_size(bytes.len())?;

        if checksum.is_empty() {
            warn!(
                "Downloaded {} bytes for model {} (checksum verification skipped)",
                bytes.len(),
                model_name
            );
        } else {
            verify_checksum(model_name, &bytes, checksum)?;
        }

        write_atomically(&model_path, &bytes)?;

        info!("Model {} saved to {:?}", model_name, model_path);
        Ok(model_path)
    }
}

fn validate_model_name(model_name: &str) -> Result<(), AnalyzerError> {
    if model_name.is_empty() || model_name.len() > 255 {
        return Err(AnalyzerError::Model("Invalid model name".to_string()));
    }
    if model_name.contains("..") || model_name.contains('/') || model_name.contains('\\') {
        return Err(AnalyzerError::Model(
            "Model name contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), AnalyzerError> {
    if url.is_empty() || url.len() > 2048 {
        return Err(AnalyzerError::Model("Invalid URL".to_string()));
    }
    if !url.starts_with("https://") {
        return Err(AnalyzerError::Model(
            "Only HTTPS URLs are allowed for model downloads".to_string(),
        ));
    }
    Ok(())
}

fn check_size(len: usize) -> Result<(), AnalyzerError> {
    if len > MAX_MODEL_SIZE {
        return Err(AnalyzerError::Model(format!(
            "Downloaded model too large: {} bytes (max {} bytes)",
            len, MAX_MODEL_SIZE
        )));
    }
    if len < MIN_MODEL_SIZE {
        return Err(AnalyzerError::Model(
            "Downloaded file too small, likely corrupted".to_string(),
        ));
    }
    Ok(())
}

/// Compare the SHA-256 of `bytes` against a hex digest (case-insensitive)
pub fn verify_checksum(model_name: &str, bytes: &[u8], expected: &str) -> Result<(), AnalyzerError> {
    let computed = hex::encode(Sha256::digest(bytes));
    if !computed.eq_ignore_ascii_case(expected) {
        return Err(AnalyzerError::Model(format!(
            "Checksum mismatch for model {}: expected {}, got {}",
            model_name, expected, computed
        )));
    }
    info!("Verified checksum for model {}", model_name);
    Ok(())
}

// Temp file first, then rename, so a crash never leaves a truncated model.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), AnalyzerError> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        AnalyzerError::Io(e)
    })
}
