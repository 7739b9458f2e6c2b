//! Single-upload enhancement pipeline: validate → load → reshape → infer → reshape.

use ndarray::{Array1, Axis};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::{self, AudioError, DecodedSignal};
use crate::enhancement::{EnhancementError, SpeechEnhancer};
use crate::validation::is_allowed;

/// Relative length of an unpadded signal
pub const FULL_LENGTH: f32 = 1.0;

/// Errors returned by the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid file type. Please upload a WAV file.")]
    InvalidFileType { filename: String },

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Audio must be mono (single channel), got {channels} channels")]
    NotMono { channels: usize },

    #[error("Enhancement failed: {0}")]
    Enhancement(#[from] EnhancementError),

    #[error("Enhancement returned shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl PipelineError {
    /// Whether the upload itself was at fault (as opposed to inference)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidFileType { .. }
                | PipelineError::Audio(_)
                | PipelineError::NotMono { .. }
        )
    }
}

/// Original and enhanced signals sharing one sample rate
#[derive(Debug, Clone)]
pub struct ProcessedAudio {
    pub original: Vec<f32>,
    pub enhanced: Vec<f32>,
    pub sample_rate: u32,
}

/// Validate the file name, decode the bytes and check the mono precondition.
///
/// Nothing here touches the enhancement model.
pub fn prepare_upload(filename: &str, bytes: &[u8]) -> Result<DecodedSignal, PipelineError> {
    if !is_allowed(filename) {
        warn!("Rejected upload {:?}: invalid file type", filename);
        return Err(PipelineError::InvalidFileType {
            filename: filename.to_string(),
        });
    }

    let signal = audio::load(bytes).map_err(|e| {
        warn!("Rejected upload {:?}: {}", filename, e);
        PipelineError::from(e)
    })?;

    if signal.channels() != 1 {
        warn!(
            "Rejected upload {:?}: {} channels",
            filename,
            signal.channels()
        );
        return Err(PipelineError::NotMono {
            channels: signal.channels(),
        });
    }

    Ok(signal)
}

/// Run the enhancement capability on one mono signal.
///
/// The channel axis is squeezed away, a batch axis of size 1 is inserted and
/// the length vector is `[1.0]`. The batch axis is stripped from the result,
/// which has exactly as many samples as the input.
pub fn enhance_signal(
    enhancer: &mut dyn SpeechEnhancer,
    signal: &DecodedSignal,
) -> Result<Vec<f32>, PipelineError> {
    if signal.channels() != 1 {
        return Err(PipelineError::NotMono {
            channels: signal.channels(),
        });
    }

    let mono = signal.samples.index_axis(Axis(0), 0);
    let num_samples = mono.len();
    let batch = mono.insert_axis(Axis(0));
    let lengths = Array1::from_elem(1, FULL_LENGTH);

    let enhanced = enhancer.enhance_batch(batch, lengths.view())?;

    if enhanced.dim() != (1, num_samples) {
        return Err(PipelineError::ShapeMismatch {
            expected: (1, num_samples),
            found: enhanced.dim(),
        });
    }

    Ok(enhanced.index_axis_move(Axis(0), 0).to_vec())
}

/// Full pipeline for one upload
pub fn process_upload(
    enhancer: &mut dyn SpeechEnhancer,
    filename: &str,
    bytes: &[u8],
) -> Result<ProcessedAudio, PipelineError> {
    let signal = prepare_upload(filename, bytes)?;
    run_enhancement(enhancer, signal)
}

/// Enhance an already prepared upload and pair it with the original
pub fn run_enhancement(
    enhancer: &mut dyn SpeechEnhancer,
    signal: DecodedSignal,
) -> Result<ProcessedAudio, PipelineError> {
    let start = Instant::now();
    let enhanced = enhance_signal(enhancer, &signal)?;

    info!(
        "Enhanced {} samples ({:.2}s) in {}ms",
        enhanced.len(),
        signal.duration(),
        start.elapsed().as_millis()
    );

    Ok(ProcessedAudio {
        original: signal.samples.row(0).to_vec(),
        enhanced,
        sample_rate: signal.sample_rate,
    })
}
