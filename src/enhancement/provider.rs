//! Spectral-mask speech enhancement provider.
//!
//! The pretrained model (MetricGAN+ style) estimates a time-frequency mask
//! from log-compressed STFT magnitudes. Enhancement is:
//! 1. STFT of each batch row (512-point FFT, 256 hop, Hamming window)
//! 2. Features = `log1p(|X|)`
//! 3. Run the ONNX model on `[batch, frames, 257]` features plus relative lengths
//! 4. Enhanced magnitude = `expm1(mask * features)`, resynthesised with the noisy phase

use ndarray::{Array2, ArrayView1, ArrayView2};
#[cfg(feature = "enhancement")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use thiserror::Error;

use super::stft::{magnitude, with_phase_of, Spectrum, Stft, FREQ_BINS};

/// ONNX graph input holding the log-magnitude features
pub const FEATS_INPUT: &str = "feats";
/// ONNX graph input holding relative lengths
pub const LENGTHS_INPUT: &str = "lengths";
/// ONNX graph output holding the estimated mask
pub const MASK_OUTPUT: &str = "mask";

/// Errors that can occur during speech enhancement
#[derive(Debug, Error)]
pub enum EnhancementError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Feature not enabled")]
    FeatureNotEnabled,
}

/// Configuration for speech enhancement
#[derive(Debug, Clone)]
pub struct EnhancementConfig {
    /// Path to the mask estimator ONNX model
    pub model_path: std::path::PathBuf,
    /// Number of threads for ONNX inference
    pub n_threads: usize,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            model_path: std::path::PathBuf::new(),
            n_threads: 1,
        }
    }
}

/// A batched speech enhancement capability.
///
/// `batch` is `[batch, samples]` with samples in `[-1, 1]`; `lengths` holds one
/// relative length in `(0, 1]` per row (the fraction of the row that is real
/// signal rather than padding). The result has the same shape as `batch`.
///
/// Implementations may keep internal inference state, hence `&mut self`;
/// callers sharing one instance must serialise access.
pub trait SpeechEnhancer: Send {
    fn enhance_batch(
        &mut self,
        batch: ArrayView2<'_, f32>,
        lengths: ArrayView1<'_, f32>,
    ) -> Result<Array2<f32>, EnhancementError>;

    /// Human-readable description for health reporting
    fn describe(&self) -> String;

    /// Check if the provider is ready
    fn is_ready(&self) -> bool {
        true
    }
}

/// Check that `lengths` matches the batch and holds relative lengths
pub fn validate_batch(
    batch: &ArrayView2<'_, f32>,
    lengths: &ArrayView1<'_, f32>,
) -> Result<(), EnhancementError> {
    if lengths.len() != batch.nrows() {
        return Err(EnhancementError::InvalidInput(format!(
            "{} lengths for a batch of {}",
            lengths.len(),
            batch.nrows()
        )));
    }
    if let Some(bad) = lengths.iter().find(|&&l| !(l > 0.0 && l <= 1.0)) {
        return Err(EnhancementError::InvalidInput(format!(
            "relative length {} outside (0, 1]",
            bad
        )));
    }
    Ok(())
}

/// STFT a row and return its spectra with `log1p` magnitude features
pub fn log_magnitude_features(stft: &mut Stft, audio: &[f32]) -> (Vec<Spectrum>, Vec<Vec<f32>>) {
    let spectra = stft.forward(audio);
    let feats = spectra
        .iter()
        .map(|frame| magnitude(frame).into_iter().map(f32::ln_1p).collect())
        .collect();
    (spectra, feats)
}

/// Apply a mask in the log domain and resynthesise with the noisy phase.
///
/// `mask` is laid out frame-major like `feats`. Samples past the row's
/// relative length are zeroed.
pub fn resynthesize(
    stft: &mut Stft,
    spectra: &[Spectrum],
    feats: &[Vec<f32>],
    mask: &[f32],
    num_samples: usize,
    relative_length: f32,
) -> Vec<f32> {
    let enhanced: Vec<Spectrum> = spectra
        .iter()
        .zip(feats.iter())
        .zip(mask.chunks(FREQ_BINS))
        .map(|((noisy, feat), frame_mask)| {
            let mags: Vec<f32> = feat
                .iter()
                .zip(frame_mask.iter())
                .map(|(&f, &m)| (m * f).exp_m1().max(0.0))
                .collect();
            with_phase_of(&mags, noisy)
        })
        .collect();

    let mut audio = stft.inverse(&enhanced, num_samples);

    for sample in audio.iter_mut().skip(valid_samples(relative_length, num_samples)) {
        *sample = 0.0;
    }
    audio
}

/// Number of leading samples a relative length marks as real signal.
///
/// Computed in `f64` so a full-length row stays full length past 2^24 samples.
pub fn valid_samples(relative_length: f32, num_samples: usize) -> usize {
    if relative_length >= 1.0 {
        return num_samples;
    }
    ((relative_length as f64 * num_samples as f64).round() as usize).min(num_samples)
}

/// Speech enhancement provider backed by an ONNX mask estimator
#[cfg(feature = "enhancement")]
pub struct SpectralMaskEnhancer {
    session: Session,
    config: EnhancementConfig,
    stft: Stft,
}

#[cfg(feature = "enhancement")]
impl SpectralMaskEnhancer {
    /// Create a new enhancement provider
    pub fn new(config: EnhancementConfig) -> Result<Self, EnhancementError> {
        if !config.model_path.exists() {
            return Err(EnhancementError::ModelLoadError(format!(
                "Model not found at {:?}",
                config.model_path
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| EnhancementError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EnhancementError::ModelLoadError(e.to_string()))?
            .with_intra_threads(config.n_threads)
            .map_err(|e: ort::Error| EnhancementError::ModelLoadError(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e: ort::Error| EnhancementError::ModelLoadError(e.to_string()))?;

        tracing::info!(
            "Enhancement provider initialized with model: {:?}",
            config.model_path
        );

        Ok(Self {
            session,
            config,
            stft: Stft::new(),
        })
    }

    /// Run the mask estimator on `[batch, frames, FREQ_BINS]` features
    fn estimate_mask(
        &mut self,
        feats: Vec<f32>,
        lengths: Vec<f32>,
        batch: usize,
        frames: usize,
    ) -> Result<Vec<f32>, EnhancementError> {
        let feats_tensor = Value::from_array(([batch, frames, FREQ_BINS], feats))
            .map_err(|e: ort::Error| EnhancementError::InferenceError(e.to_string()))?;

        let lengths_tensor = Value::from_array(([batch], lengths))
            .map_err(|e: ort::Error| EnhancementError::InferenceError(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                FEATS_INPUT => feats_tensor,
                LENGTHS_INPUT => lengths_tensor
            ])
            .map_err(|e: ort::Error| EnhancementError::InferenceError(e.to_string()))?;

        let mask_output = outputs.get(MASK_OUTPUT).ok_or_else(|| {
            EnhancementError::InferenceError(format!("Missing '{}' output", MASK_OUTPUT))
        })?;
        let mask_tensor = mask_output
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| EnhancementError::InferenceError(e.to_string()))?;
        let mask: Vec<f32> = mask_tensor.1.to_vec();

        let expected = batch * frames * FREQ_BINS;
        if mask.len() != expected {
            return Err(EnhancementError::InferenceError(format!(
                "Mask has {} values, expected {} ([{}, {}, {}])",
                mask.len(),
                expected,
                batch,
                frames,
                FREQ_BINS
            )));
        }

        Ok(mask)
    }
}

#[cfg(feature = "enhancement")]
impl SpeechEnhancer for SpectralMaskEnhancer {
    fn enhance_batch(
        &mut self,
        batch: ArrayView2<'_, f32>,
        lengths: ArrayView1<'_, f32>,
    ) -> Result<Array2<f32>, EnhancementError> {
        validate_batch(&batch, &lengths)?;

        let (rows, num_samples) = batch.dim();
        let mut all_spectra = Vec::with_capacity(rows);
        let mut all_feats = Vec::with_capacity(rows);

        for row in batch.rows() {
            let audio: Vec<f32> = row.iter().copied().collect();
            let (spectra, feats) = log_magnitude_features(&mut self.stft, &audio);
            all_spectra.push(spectra);
            all_feats.push(feats);
        }

        let frames = all_feats.first().map(|f| f.len()).unwrap_or(0);
        let flat_feats: Vec<f32> = all_feats.iter().flatten().flatten().copied().collect();

        let mask = self.estimate_mask(flat_feats, lengths.to_vec(), rows, frames)?;

        let mut output = Vec::with_capacity(rows * num_samples);
        let row_mask_len = frames * FREQ_BINS;
        for (idx, (spectra, feats)) in all_spectra.iter().zip(all_feats.iter()).enumerate() {
            let row_mask = &mask[idx * row_mask_len..(idx + 1) * row_mask_len];
            output.extend(resynthesize(
                &mut self.stft,
                spectra,
                feats,
                row_mask,
                num_samples,
                lengths[idx],
            ));
        }

        tracing::debug!(
            "Spectral mask enhanced batch: {} x {} samples, {} frames",
            rows,
            num_samples,
            frames
        );

        Array2::from_shape_vec((rows, num_samples), output)
            .map_err(|e| EnhancementError::InferenceError(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("spectral mask (ONNX) {}", self.config.model_path.display())
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "enhancement"))]
pub struct SpectralMaskEnhancer;

#[cfg(not(feature = "enhancement"))]
impl SpectralMaskEnhancer {
    pub fn new(_config: EnhancementConfig) -> Result<Self, EnhancementError> {
        Err(EnhancementError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "enhancement"))]
impl SpeechEnhancer for SpectralMaskEnhancer {
    fn enhance_batch(
        &mut self,
        _batch: ArrayView2<'_, f32>,
        _lengths: ArrayView1<'_, f32>,
    ) -> Result<Array2<f32>, EnhancementError> {
        Err(EnhancementError::FeatureNotEnabled)
    }

    fn describe(&self) -> String {
        "disabled".to_string()
    }

    fn is_ready(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use std::f32::consts::PI;

    /// Generate speech-like signal (mixed frequencies)
    fn generate_speech_signal(samples: usize) -> Vec<f32> {
        let sample_rate = 16000.0;
        (0..samples)
            .map(|i| {
                let t = i as f32 / sample_rate;
                let f1 = (2.0 * PI * 200.0 * t).sin() * 0.4;
                let f2 = (2.0 * PI * 400.0 * t).sin() * 0.3;
                let f3 = (2.0 * PI * 800.0 * t).sin() * 0.2;
                f1 + f2 + f3
            })
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = EnhancementConfig::default();
        assert_eq!(config.n_threads, 1);
    }

    #[test]
    fn test_validate_batch() {
        let batch = Array2::<f32>::zeros((1, 100));
        assert!(validate_batch(&batch.view(), &arr1(&[1.0f32]).view()).is_ok());
        assert!(validate_batch(&batch.view(), &arr1(&[0.5f32]).view()).is_ok());

        let too_many = arr1(&[1.0f32, 1.0]);
        assert!(matches!(
            validate_batch(&batch.view(), &too_many.view()),
            Err(EnhancementError::InvalidInput(_))
        ));

        for bad in [0.0f32, -0.5, 1.5, f32::NAN] {
            let lengths = arr1(&[bad]);
            assert!(
                validate_batch(&batch.view(), &lengths.view()).is_err(),
                "length {} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_features_are_log1p_magnitudes() {
        let audio = generate_speech_signal(2048);
        let mut stft = Stft::new();
        let (spectra, feats) = log_magnitude_features(&mut stft, &audio);

        assert_eq!(spectra.len(), feats.len());
        for (frame, feat) in spectra.iter().zip(feats.iter()) {
            assert_eq!(feat.len(), FREQ_BINS);
            for (bin, &f) in frame.iter().zip(feat.iter()) {
                assert!((f - bin.norm().ln_1p()).abs() < 1e-5);
                assert!(f >= 0.0);
            }
        }
    }

    #[test]
    fn test_unit_mask_reconstructs_input() {
        let audio = generate_speech_signal(4000);
        let mut stft = Stft::new();
        let (spectra, feats) = log_magnitude_features(&mut stft, &audio);
        let mask = vec![1.0f32; spectra.len() * FREQ_BINS];

        let output = resynthesize(&mut stft, &spectra, &feats, &mask, audio.len(), 1.0);
        assert_eq!(output.len(), audio.len());
        let max_error = audio
            .iter()
            .zip(output.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_error < 1e-3, "Max reconstruction error too high: {}", max_error);
    }

    #[test]
    fn test_zero_mask_silences_output() {
        let audio = generate_speech_signal(2000);
        let mut stft = Stft::new();
        let (spectra, feats) = log_magnitude_features(&mut stft, &audio);
        let mask = vec![0.0f32; spectra.len() * FREQ_BINS];

        let output = resynthesize(&mut stft, &spectra, &feats, &mask, audio.len(), 1.0);
        assert!(output.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_relative_length_zeroes_padding() {
        let audio = generate_speech_signal(1000);
        let mut stft = Stft::new();
        let (spectra, feats) = log_magnitude_features(&mut stft, &audio);
        let mask = vec![1.0f32; spectra.len() * FREQ_BINS];

        let output = resynthesize(&mut stft, &spectra, &feats, &mask, audio.len(), 0.5);
        assert_eq!(output.len(), 1000);
        assert!(output[..500].iter().any(|s| s.abs() > 1e-3));
        assert!(output[500..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_valid_samples_full_length_above_f32_precision() {
        let odd = (1usize << 24) + 1;
        assert_eq!(valid_samples(1.0, odd), odd);
        assert_eq!(valid_samples(1.0, 30_000_001), 30_000_001);
        assert_eq!(valid_samples(0.5, odd), (1usize << 23) + 1);
        assert_eq!(valid_samples(0.5, 1000), 500);
        assert_eq!(valid_samples(0.0, 1000), 0);
    }

    #[test]
    fn test_full_length_keeps_last_sample() {
        let n = 4097;
        let audio = vec![0.3f32; n];
        let mut stft = Stft::new();
        let (spectra, feats) = log_magnitude_features(&mut stft, &audio);
        let mask = vec![1.0f32; spectra.len() * FREQ_BINS];

        let output = resynthesize(&mut stft, &spectra, &feats, &mask, n, 1.0);
        assert_eq!(output.len(), n);
        assert!((output[n - 1] - 0.3).abs() < 1e-3, "last sample was {}", output[n - 1]);
    }

    #[test]
    #[ignore = "slow: resynthesises more than 2^24 samples"]
    fn test_full_length_keeps_last_sample_of_long_row() {
        let n = (1usize << 24) + 1;
        let audio = vec![0.3f32; n];
        let mut stft = Stft::new();
        let (spectra, feats) = log_magnitude_features(&mut stft, &audio);
        let mask = vec![1.0f32; spectra.len() * FREQ_BINS];

        let output = resynthesize(&mut stft, &spectra, &feats, &mask, n, 1.0);
        assert_eq!(output.len(), n);
        assert!(output[n - 1] != 0.0);
    }

    #[cfg(not(feature = "enhancement"))]
    #[test]
    fn test_stub_provider() {
        let result = SpectralMaskEnhancer::new(EnhancementConfig::default());
        assert!(matches!(result, Err(EnhancementError::FeatureNotEnabled)));
    }

    // Integration tests requiring ONNX model
    // Note: These tests require ORT_DYLIB_PATH to be set to the ONNX Runtime library
    #[cfg(feature = "enhancement")]
    mod integration_tests {
        use super::*;
        use crate::config::Config;
        use crate::models::cached_model_path;

        /// Check if ONNX Runtime is available
        fn ort_available() -> bool {
            std::env::var("ORT_DYLIB_PATH")
                .map(|p| std::path::Path::new(&p).exists())
                .unwrap_or(false)
        }

        fn create_provider() -> Option<SpectralMaskEnhancer> {
            if !ort_available() {
                return None;
            }
            let model_path = cached_model_path(&Config::default());
            if !model_path.exists() {
                return None;
            }
            match SpectralMaskEnhancer::new(EnhancementConfig { model_path, n_threads: 1 }) {
                Ok(p) => Some(p),
                Err(e) => {
                    eprintln!("Skipping test: failed to create provider: {}", e);
                    None
                }
            }
        }

        #[test]
        fn test_missing_model_is_load_error() {
            let config = EnhancementConfig {
                model_path: "/nonexistent/enhance_model.onnx".into(),
                n_threads: 1,
            };
            assert!(matches!(
                SpectralMaskEnhancer::new(config),
                Err(EnhancementError::ModelLoadError(_))
            ));
        }

        #[test]
        fn test_enhance_preserves_shape() {
            let Some(mut provider) = create_provider() else {
                eprintln!("Skipping test_enhance_preserves_shape: model not found");
                return;
            };

            for samples in [100, 1023, 16000, 32000] {
                let audio = ndarray::Array1::from(generate_speech_signal(samples)).insert_axis(ndarray::Axis(0));
                let lengths = arr1(&[1.0f32]);
                let enhanced = provider
                    .enhance_batch(audio.view(), lengths.view())
                    .expect("Enhancement failed");
                assert_eq!(enhanced.dim(), (1, samples));
            }
        }

        #[test]
        fn test_enhance_is_repeatable() {
            let Some(mut provider) = create_provider() else {
                eprintln!("Skipping test_enhance_is_repeatable: model not found");
                return;
            };

            let audio = ndarray::Array1::from(generate_speech_signal(16000)).insert_axis(ndarray::Axis(0));
            let lengths = arr1(&[1.0f32]);
            let first = provider.enhance_batch(audio.view(), lengths.view()).unwrap();
            let second = provider.enhance_batch(audio.view(), lengths.view()).unwrap();

            for (a, b) in first.iter().zip(second.iter()) {
                assert!((a - b).abs() < 1e-5, "Results differ between calls");
            }
        }
    }
}
