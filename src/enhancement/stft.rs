//! Short-time Fourier transform used by the spectral-mask enhancer.
//!
//! Frames are centered (the signal is zero-padded by `n_fft / 2` on both
//! sides) so every input sample is covered by a full window and the inverse
//! transform can return exactly the original number of samples.

use rustfft::{num_complex::Complex, FftPlanner};

/// FFT size (32 ms at 16kHz)
pub const FFT_SIZE: usize = 512;
/// Hop between frames (16 ms at 16kHz)
pub const HOP_SIZE: usize = 256;
/// Positive-frequency bins per frame
pub const FREQ_BINS: usize = FFT_SIZE / 2 + 1; // 257

/// One analysis frame: `FREQ_BINS` complex bins
pub type Spectrum = Vec<Complex<f32>>;

/// Periodic Hamming window of length `n`
pub fn hamming_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
        .collect()
}

/// Number of centered frames for a signal of `len` samples
pub fn frame_count(len: usize) -> usize {
    len / HOP_SIZE + 1
}

/// Forward/inverse STFT with a shared FFT planner
pub struct Stft {
    planner: FftPlanner<f32>,
    window: Vec<f32>,
}

impl Default for Stft {
    fn default() -> Self {
        Self::new()
    }
}

impl Stft {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            window: hamming_window(FFT_SIZE),
        }
    }

    /// Compute the centered STFT of `audio`
    pub fn forward(&mut self, audio: &[f32]) -> Vec<Spectrum> {
        let fft = self.planner.plan_fft_forward(FFT_SIZE);
        let num_frames = frame_count(audio.len());
        let pad = FFT_SIZE / 2;

        let mut frames = Vec::with_capacity(num_frames);
        for frame_idx in 0..num_frames {
            // Position of the frame's first sample in the unpadded signal
            let start = (frame_idx * HOP_SIZE) as isize - pad as isize;

            let mut buffer: Vec<Complex<f32>> = (0..FFT_SIZE)
                .map(|i| {
                    let pos = start + i as isize;
                    let sample = if pos >= 0 && (pos as usize) < audio.len() {
                        audio[pos as usize] * self.window[i]
                    } else {
                        0.0
                    };
                    Complex::new(sample, 0.0)
                })
                .collect();

            fft.process(&mut buffer);
            buffer.truncate(FREQ_BINS);
            frames.push(buffer);
        }

        frames
    }

    /// Overlap-add inverse of [`Stft::forward`], returning exactly `length` samples
    pub fn inverse(&mut self, frames: &[Spectrum], length: usize) -> Vec<f32> {
        if frames.is_empty() {
            return vec![0.0; length];
        }

        let ifft = self.planner.plan_fft_inverse(FFT_SIZE);
        let output_len = (frames.len() - 1) * HOP_SIZE + FFT_SIZE;

        let mut output = vec![0.0f32; output_len];
        let mut window_sum = vec![0.0f32; output_len];

        for (frame_idx, spectrum) in frames.iter().enumerate() {
            debug_assert_eq!(spectrum.len(), FREQ_BINS);

            let mut buffer: Vec<Complex<f32>> = (0..FFT_SIZE)
                .map(|i| {
                    if i < FREQ_BINS {
                        spectrum[i]
                    } else {
                        // Conjugate symmetry for negative frequencies
                        spectrum[FFT_SIZE - i].conj()
                    }
                })
                .collect();

            ifft.process(&mut buffer);

            let start = frame_idx * HOP_SIZE;
            for (i, sample) in buffer.iter().enumerate() {
                output[start + i] += sample.re * self.window[i] / FFT_SIZE as f32;
                window_sum[start + i] += self.window[i] * self.window[i];
            }
        }

        for (out, win) in output.iter_mut().zip(window_sum.iter()) {
            if *win > 1e-8 {
                *out /= win;
            }
        }

        // Drop the centering pad and match the requested length
        let pad = FFT_SIZE / 2;
        let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(length).collect();
        trimmed.resize(length, 0.0);
        trimmed
    }
}

/// Magnitude of every bin
pub fn magnitude(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum.iter().map(|bin| bin.norm()).collect()
}

/// Rebuild a spectrum from new magnitudes and the phase of `reference`
pub fn with_phase_of(magnitudes: &[f32], reference: &[Complex<f32>]) -> Spectrum {
    magnitudes
        .iter()
        .zip(reference.iter())
        .map(|(&mag, bin)| Complex::from_polar(mag, bin.arg()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn generate_sine(samples: usize, freq: f32, sample_rate: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(0), 1);
        assert_eq!(frame_count(255), 1);
        assert_eq!(frame_count(256), 2);
        // 2 s at 16kHz
        assert_eq!(frame_count(32000), 126);
    }

    #[test]
    fn test_hamming_window() {
        let window = hamming_window(FFT_SIZE);
        assert_eq!(window.len(), FFT_SIZE);
        assert!((window[0] - 0.08).abs() < 1e-6);
        assert!((window[FFT_SIZE / 2] - 1.0).abs() < 1e-6);
        for i in 1..FFT_SIZE / 2 {
            assert!(
                (window[i] - window[FFT_SIZE - i]).abs() < 1e-5,
                "Symmetry failed at i={}",
                i
            );
        }
    }

    #[test]
    fn test_forward_shape() {
        let mut stft = Stft::new();
        let frames = stft.forward(&vec![0.1f32; 1000]);
        assert_eq!(frames.len(), frame_count(1000));
        assert!(frames.iter().all(|f| f.len() == FREQ_BINS));
    }

    #[test]
    fn test_reconstruction() {
        let audio = generate_sine(4000, 440.0, 16000.0);
        let mut stft = Stft::new();
        let frames = stft.forward(&audio);
        let output = stft.inverse(&frames, audio.len());

        assert_eq!(output.len(), audio.len());

        let mut max_error: f32 = 0.0;
        for (a, b) in audio.iter().zip(output.iter()) {
            max_error = max_error.max((a - b).abs());
        }
        assert!(max_error < 1e-3, "Max reconstruction error too high: {}", max_error);
    }

    #[test]
    fn test_reconstruction_odd_length() {
        let audio = generate_sine(1023, 300.0, 16000.0);
        let mut stft = Stft::new();
        let frames = stft.forward(&audio);
        let output = stft.inverse(&frames, audio.len());
        assert_eq!(output.len(), 1023);
        assert!((output[500] - audio[500]).abs() < 1e-3);
    }

    #[test]
    fn test_short_and_empty_audio() {
        let mut stft = Stft::new();

        let short = vec![0.5f32; 10];
        let frames = stft.forward(&short);
        assert_eq!(frames.len(), 1);
        let output = stft.inverse(&frames, short.len());
        assert_eq!(output.len(), 10);

        let frames = stft.forward(&[]);
        assert!(stft.inverse(&frames, 0).is_empty());
    }

    #[test]
    fn test_magnitude_and_phase() {
        let spectrum = vec![Complex::new(3.0f32, 4.0), Complex::new(0.0, -2.0)];
        let mags = magnitude(&spectrum);
        assert!((mags[0] - 5.0).abs() < 1e-6);
        assert!((mags[1] - 2.0).abs() < 1e-6);

        let rebuilt = with_phase_of(&mags, &spectrum);
        for (a, b) in rebuilt.iter().zip(spectrum.iter()) {
            assert!((a - b).norm() < 1e-5);
        }
    }
}
