use std::{f32::consts::PI, sync::Arc};

use realfft::{RealFftPlanner, RealToComplex};

use crate::{Error, Result};

/// Magnitude short-time Fourier transform with a periodic Hann window.
///
/// Frames advance by `hop_length` and the tail is zero-padded, so every
/// non-empty input produces at least one frame. Each frame yields
/// `n_fft / 2 + 1` magnitude bins (DC through Nyquist).
pub struct MagnitudeStft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward_plan: Arc<dyn RealToComplex<f32>>,
}

impl MagnitudeStft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        MagnitudeStft {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            forward_plan: planner.plan_fft_forward(n_fft),
        }
    }

    /// Number of frequency bins per frame.
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Center frequency of `bin` in Hz at the given sample rate.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.n_fft as f32
    }

    /// Computes the magnitude spectrogram, one `num_bins()`-length row per
    /// frame. Frame count is `ceil(len / hop_length)`, minimum one.
    pub fn magnitudes(&self, samples: &[f32]) -> Result<Vec<Vec<f32>>> {
        let hl = self.hop_length;
        let num_frames = samples.len().div_ceil(hl).max(1);
        let padded_len = (num_frames - 1) * hl + self.n_fft;

        let mut padded = Vec::with_capacity(padded_len);
        padded.extend_from_slice(samples);
        padded.resize(padded_len, 0.0);

        let mut scratch = self.forward_plan.make_scratch_vec();
        let mut frame_freq = self.forward_plan.make_output_vec();
        let mut frame_time = self.forward_plan.make_input_vec();
        let mut frames = Vec::with_capacity(num_frames);

        for f in 0..num_frames {
            let start = f * hl;
            frame_time.copy_from_slice(&padded[start..start + self.n_fft]);

            // Apply window
            frame_time
                .iter_mut()
                .zip(self.window.iter())
                .for_each(|(x, w)| *x *= w);

            self.forward_plan
                .process_with_scratch(&mut frame_time, &mut frame_freq, &mut scratch)
                .map_err(|e| Error::Fft(format!("forward FFT failed: {}", e)))?;

            frames.push(frame_freq.iter().map(|c| c.norm()).collect());
        }

        Ok(frames)
    }
}

/// Generates a periodic Hann window of length `n_fft`.
fn hann_window(n_fft: usize) -> Vec<f32> {
    (0..n_fft)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_fft as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_hop_alignment() {
        let stft = MagnitudeStft::new(2048, 512);
        let frames = stft.magnitudes(&vec![0.0f32; 4096]).unwrap();
        assert_eq!(frames.len(), 8); // ceil(4096 / 512)
        assert_eq!(frames[0].len(), stft.num_bins());
    }

    #[test]
    fn short_input_yields_one_frame() {
        let stft = MagnitudeStft::new(2048, 512);
        let frames = stft.magnitudes(&[0.5f32; 100]).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn silence_produces_zero_magnitudes() {
        let stft = MagnitudeStft::new(2048, 512);
        let frames = stft.magnitudes(&vec![0.0f32; 8192]).unwrap();
        let max_mag = frames
            .iter()
            .flatten()
            .fold(0.0f32, |acc, &m| acc.max(m));
        assert!(max_mag < 1e-10, "silence should produce near-zero output");
    }

    #[test]
    fn sine_peaks_at_its_frequency_bin() {
        let n_fft = 2048;
        let sample_rate = 22_050u32;
        let freq = 1000.0f32;
        let samples: Vec<f32> = (0..8192)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();

        let stft = MagnitudeStft::new(n_fft, 512);
        let frames = stft.magnitudes(&samples).unwrap();

        // Check an interior frame: its peak bin should sit at ~1000 Hz
        let frame = &frames[4];
        let peak_bin = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .unwrap();
        let peak_hz = stft.bin_frequency(peak_bin, sample_rate);
        assert!(
            (peak_hz - freq).abs() < 25.0,
            "expected peak near {freq} Hz, got {peak_hz} Hz"
        );
    }
}
