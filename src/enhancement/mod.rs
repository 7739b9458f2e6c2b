//! Speech enhancement by spectral masking.
//!
//! A pretrained mask estimator (MetricGAN+ family, exported to ONNX) scales
//! the noisy STFT magnitudes; the enhanced waveform is resynthesised with the
//! noisy phase, so it always has the same length and rate as the input.

mod provider;
pub mod stft;

pub use provider::{
    log_magnitude_features, resynthesize, valid_samples, validate_batch, EnhancementConfig,
    EnhancementError, SpectralMaskEnhancer, SpeechEnhancer,
};
