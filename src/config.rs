use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pretrained enhancement model used when nothing else is configured.
///
/// Resolved as a Hugging Face repo id, so it only works where that repo
/// hosts `DEFAULT_MODEL_FILE` as an ONNX export. Point `model_source` at a
/// local `.onnx` file (or a direct URL) for a converted MetricGAN+ model.
pub const DEFAULT_MODEL_SOURCE: &str = "speechbrain/metricgan-plus-voicebank";

/// File fetched from the model source
pub const DEFAULT_MODEL_FILE: &str = "enhance_model.onnx";

/// Default upload cap (50 MiB, roughly 26 minutes of 16-bit 16kHz mono)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    /// Local `.onnx` path, `http(s)` URL, or Hugging Face repo id
    pub model_source: String,
    /// Directory pretrained models are downloaded into
    pub cache_dir: PathBuf,
    /// File name of the model inside the source
    pub model_file: String,

    // Server
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,

    /// Number of threads for ONNX inference
    pub n_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            model_source: DEFAULT_MODEL_SOURCE.to_string(),
            cache_dir: Self::default_cache_dir()
                .unwrap_or_else(|_| PathBuf::from("pretrained_models")),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8501,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))
        } else {
            debug!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Failed to get home directory")?;
        Ok(home.join(".speech-enhance"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    /// Get the default pretrained model cache
    pub fn default_cache_dir() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("pretrained_models"))
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.model_source, "speechbrain/metricgan-plus-voicebank");
        assert_eq!(config.model_file, "enhance_model.onnx");
        assert_eq!(config.port, 8501);
        assert_eq!(config.n_threads, 1);
        assert!(config.cache_dir.ends_with("pretrained_models"));
    }

    #[test]
    fn test_bind_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Config::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.model_source, DEFAULT_MODEL_SOURCE);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            model_source: "/opt/models/mask.onnx".to_string(),
            cache_dir: dir.path().join("cache"),
            port: 9100,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.model_source, "/opt/models/mask.onnx");
        assert_eq!(loaded.cache_dir, dir.path().join("cache"));
        assert_eq!(loaded.port, 9100);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "port": 7000 }"#).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.port, 7000);
        assert_eq!(loaded.model_file, DEFAULT_MODEL_FILE);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
