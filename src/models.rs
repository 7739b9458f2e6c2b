//! Pretrained model resolution and download.
//!
//! The enhancement model is fetched once, before the server accepts requests,
//! into the configured cache directory. Later starts reuse the cached file.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;

/// Base URL for Hugging Face hosted models
const HF_BASE_URL: &str = "https://huggingface.co";

/// Appended to model resolution failures
const ONNX_EXPORT_HINT: &str =
    "expected an ONNX export of the mask estimator; pass a local .onnx path with --model-source";

/// Errors that can occur during model operations
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to download model: {0}")]
    DownloadError(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),

    #[error("Failed to write model file: {0}")]
    WriteError(String),

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Where a configured model source points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A model file already on disk
    LocalFile(PathBuf),
    /// A direct download URL
    Url(String),
    /// A Hugging Face repo id such as `owner/name`
    HubRepo(String),
}

impl ModelSource {
    /// Classify a configured source string
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            return ModelSource::Url(source.to_string());
        }
        let path = Path::new(source);
        if path.is_file() || source.ends_with(".onnx") {
            return ModelSource::LocalFile(path.to_path_buf());
        }
        ModelSource::HubRepo(source.trim_matches('/').to_string())
    }

    /// Download URL for this source, if it is remote
    pub fn url(&self, model_file: &str) -> Option<String> {
        match self {
            ModelSource::LocalFile(_) => None,
            ModelSource::Url(url) => Some(url.clone()),
            ModelSource::HubRepo(repo) => {
                Some(format!("{}/{}/resolve/main/{}", HF_BASE_URL, repo, model_file))
            }
        }
    }
}

/// Directory name a remote source is cached under
fn cache_key(source: &str) -> String {
    let trimmed = source
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_matches('/');

    let mut key = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '/' => key.push_str("--"),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => key.push(c),
            _ => key.push('_'),
        }
    }
    key
}

/// Cached location of the configured model
pub fn cached_model_path(config: &Config) -> PathBuf {
    match ModelSource::parse(&config.model_source) {
        ModelSource::LocalFile(path) => path,
        _ => config
            .cache_dir
            .join(cache_key(&config.model_source))
            .join(&config.model_file),
    }
}

/// Download a file from URL to the specified path
fn download_file(url: &str, dest_path: &Path) -> Result<(), ModelError> {
    info!("Downloading from {} to {:?}", url, dest_path);

    // Create parent directory if needed
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ModelError::DirectoryError(e.to_string()))?;
    }

    let response = reqwest::blocking::Client::new()
        .get(url)
        .send()
        .map_err(|e| ModelError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ModelError::DownloadError(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length();
    info!(
        "Download started, total size: {}",
        total_size
            .map(|s| format!("{:.1} MB", s as f64 / 1_000_000.0))
            .unwrap_or_else(|| "unknown".to_string())
    );

    let temp_path = dest_path.with_extension("download");
    let mut file = File::create(&temp_path)
        .map_err(|e| ModelError::WriteError(e.to_string()))?;

    let bytes = response
        .bytes()
        .map_err(|e| ModelError::NetworkError(e.to_string()))?;

    file.write_all(&bytes)
        .map_err(|e| ModelError::WriteError(e.to_string()))?;

    file.flush()
        .map_err(|e| ModelError::WriteError(e.to_string()))?;

    // Rename so a half-written file is never picked up as the model
    fs::rename(&temp_path, dest_path)
        .map_err(|e| ModelError::WriteError(e.to_string()))?;

    info!("Download complete: {:?}", dest_path);
    Ok(())
}

/// Make sure the enhancement model is on disk, downloading it if necessary
pub fn ensure_enhancement_model(config: &Config) -> Result<PathBuf> {
    let source = ModelSource::parse(&config.model_source);
    let model_path = cached_model_path(config);

    if model_path.exists() {
        debug!("Enhancement model already exists: {:?}", model_path);
        return Ok(model_path);
    }

    let url = match source.url(&config.model_file) {
        Some(url) => url,
        None => {
            return Err(ModelError::NotFound(format!(
                "{} ({})",
                model_path.display(),
                ONNX_EXPORT_HINT
            ))
            .into());
        }
    };

    info!("Downloading speech enhancement model from {}...", config.model_source);
    download_file(&url, &model_path).with_context(|| {
        format!(
            "Failed to download speech enhancement model from {} ({})",
            url, ONNX_EXPORT_HINT
        )
    })?;

    Ok(model_path)
}

/// Check if the enhancement model is available locally
pub fn is_enhancement_model_available(config: &Config) -> bool {
    cached_model_path(config).exists()
}
