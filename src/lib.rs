//! Speech enhancement upload service.
//!
//! A WAV upload is validated, decoded, run through a pretrained spectral-mask
//! enhancement model and returned next to the original for playback and
//! download.

pub mod audio;
pub mod config;
pub mod enhancement;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod validation;


pub use audio::{DecodedSignal, MODEL_SAMPLE_RATE};
pub use config::Config;
pub use enhancement::{EnhancementConfig, EnhancementError, SpectralMaskEnhancer, SpeechEnhancer};
pub use pipeline::{process_upload, PipelineError, ProcessedAudio};
pub use validation::is_allowed;
