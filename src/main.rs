use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use speech_enhance::config::Config;
use speech_enhance::enhancement::{EnhancementConfig, SpectralMaskEnhancer};
use speech_enhance::models::{ensure_enhancement_model, is_enhancement_model_available};
use speech_enhance::server::{self, AppState};

/// Web service that denoises uploaded speech recordings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON config file (defaults to ~/.speech-enhance/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretrained model: local .onnx path, URL, or Hugging Face repo id
    #[arg(long)]
    model_source: Option<String>,

    /// Directory pretrained models are cached in
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Model file name inside the source
    #[arg(long)]
    model_file: Option<String>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of threads for ONNX inference
    #[arg(long)]
    threads: Option<usize>,

    /// Maximum upload size in bytes
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command line overrides on top of the loaded config
    fn apply(self, mut config: Config) -> Config {
        if let Some(source) = self.model_source {
            config.model_source = source;
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(file) = self.model_file {
            config.model_file = file;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(threads) = self.threads {
            config.n_threads = threads;
        }
        if let Some(max) = self.max_upload_bytes {
            config.max_upload_bytes = max;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let config = args.apply(Config::load(&config_path)?);

    info!("Speech enhancement service starting...");
    info!("Model source: {}", config.model_source);
    info!("Cache directory: {:?}", config.cache_dir);
    if !is_enhancement_model_available(&config) {
        info!("Enhancement model not on disk yet, resolving {}", config.model_source);
    }

    // Model is fetched and loaded once, before any request is accepted
    let startup_config = config.clone();
    let enhancer = tokio::task::spawn_blocking(move || -> Result<SpectralMaskEnhancer> {
        let model_path = ensure_enhancement_model(&startup_config)?;
        info!("Loading enhancement model from {:?}", model_path);
        let enhancer = SpectralMaskEnhancer::new(EnhancementConfig {
            model_path,
            n_threads: startup_config.n_threads,
        })
        .context("Failed to load enhancement model")?;
        Ok(enhancer)
    })
    .await
    .context("Model loading task failed")??;
    info!("Model loaded successfully");

    let state = AppState::new(Box::new(enhancer), config.max_upload_bytes);
    server::serve(&config, state).await?;

    info!("Server stopped");
    Ok(())
}
