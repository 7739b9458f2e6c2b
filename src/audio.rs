//! WAV decoding for uploads and WAV encoding for responses.
//!
//! Uploads are decoded entirely in memory. Samples are normalized to
//! `[-1.0, 1.0]` and kept as `(channels, time)` so the mono check happens
//! on the real channel layout rather than after a silent down-mix.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::{Array2, Axis};
use std::io::Cursor;
use thiserror::Error;

/// Sample rate the enhancement model was trained on
pub const MODEL_SAMPLE_RATE: u32 = 16000;

/// Errors raised while decoding or encoding audio
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Could not decode WAV data: {0}")]
    Decode(String),

    #[error("Sampling rate must be {expected} Hz, got {found} Hz")]
    InvalidSampleRate { expected: u32, found: u32 },

    #[error("Audio file contains no samples")]
    Empty,

    #[error("WAV write error: {0}")]
    Encode(String),
}

/// Decoded upload: `(channels, time)` samples plus the declared sample rate
#[derive(Debug, Clone)]
pub struct DecodedSignal {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl DecodedSignal {
    pub fn channels(&self) -> usize {
        self.samples.len_of(Axis(0))
    }

    /// Number of samples per channel
    pub fn len(&self) -> usize {
        self.samples.len_of(Axis(1))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}

/// Decode WAV bytes without checking the sample rate
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedSignal, AudioError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(AudioError::Decode("WAV header declares zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AudioError::Decode(e.to_string()))?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AudioError::Decode(e.to_string()))?
        }
    };

    let frames = interleaved.len() / channels;
    let samples = Array2::from_shape_vec((frames, channels), interleaved)
        .map_err(|e| AudioError::Decode(e.to_string()))?
        .reversed_axes()
        .as_standard_layout()
        .into_owned();

    Ok(DecodedSignal {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode an upload and enforce the model sample rate
pub fn load(bytes: &[u8]) -> Result<DecodedSignal, AudioError> {
    let signal = decode_wav(bytes)?;

    if signal.sample_rate != MODEL_SAMPLE_RATE {
        return Err(AudioError::InvalidSampleRate {
            expected: MODEL_SAMPLE_RATE,
            found: signal.sample_rate,
        });
    }
    if signal.is_empty() {
        return Err(AudioError::Empty);
    }

    tracing::debug!(
        "Decoded upload: {} channel(s), {} samples, {:.2}s",
        signal.channels(),
        signal.len(),
        signal.duration()
    );

    Ok(signal)
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buffer, spec)
            .map_err(|e| AudioError::Encode(e.to_string()))?;

        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * 32767.0) as i16)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }

    Ok(buffer.into_inner())
}
