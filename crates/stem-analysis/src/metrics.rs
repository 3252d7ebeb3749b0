use serde::{Deserialize, Serialize};

use crate::stft::MagnitudeStft;
use crate::{Error, Result};

/// Fixed analysis window: 2048-sample frames, 75% overlap. The bleed
/// thresholds are calibrated against this grid; changing it shifts every
/// verdict.
pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;

/// Spectral and energy statistics for one stem, computed once against the
/// original mix. All fields are finite, non-negative reals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Stem spectral energy over original spectral energy. Zero (never
    /// NaN or infinite) when the original carries no energy.
    pub energy_ratio: f32,
    /// Magnitude-weighted mean frequency, averaged across frames.
    pub spectral_centroid_hz: f32,
    /// Root-mean-square of the raw stem samples.
    pub rms_energy: f32,
    /// Fraction of adjacent-sample sign changes, averaged over frames.
    pub zero_crossing_rate: f32,
}

impl QualityMetrics {
    fn validated(
        energy_ratio: f32,
        spectral_centroid_hz: f32,
        rms_energy: f32,
        zero_crossing_rate: f32,
    ) -> Result<Self> {
        let fields = [
            ("energy_ratio", energy_ratio),
            ("spectral_centroid_hz", spectral_centroid_hz),
            ("rms_energy", rms_energy),
            ("zero_crossing_rate", zero_crossing_rate),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::DegenerateSignal(format!(
                    "{} is not a finite non-negative value: {}",
                    name, value
                )));
            }
        }
        Ok(QualityMetrics {
            energy_ratio,
            spectral_centroid_hz,
            rms_energy,
            zero_crossing_rate,
        })
    }
}

/// Computes [`QualityMetrics`] for one stem against the original signal.
///
/// An empty stem is degenerate; a silent (all-zero) stem is computable and
/// yields zero RMS.
pub fn compute(original: &[f32], stem: &[f32], sample_rate: u32) -> Result<QualityMetrics> {
    if stem.is_empty() {
        return Err(Error::DegenerateSignal("empty stem signal".to_string()));
    }

    let stft = MagnitudeStft::new(N_FFT, HOP_LENGTH);

    let stem_frames = stft.magnitudes(stem)?;
    let stem_energy = spectral_energy(&stem_frames);
    let original_energy = if original.is_empty() {
        0.0
    } else {
        spectral_energy(&stft.magnitudes(original)?)
    };

    let energy_ratio = if original_energy > 0.0 {
        (stem_energy / original_energy) as f32
    } else {
        0.0
    };

    QualityMetrics::validated(
        energy_ratio,
        spectral_centroid(&stft, &stem_frames, sample_rate),
        rms(stem),
        zero_crossing_rate(stem),
    )
}

/// Total squared magnitude across all frames and bins.
fn spectral_energy(frames: &[Vec<f32>]) -> f64 {
    frames
        .iter()
        .flatten()
        .map(|&m| m as f64 * m as f64)
        .sum()
}

/// Per-frame magnitude-weighted mean frequency, averaged across frames.
/// Frames with no energy contribute zero.
fn spectral_centroid(stft: &MagnitudeStft, frames: &[Vec<f32>], sample_rate: u32) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0f64;
    for frame in frames {
        let total: f64 = frame.iter().map(|&m| m as f64).sum();
        if total > 0.0 {
            let weighted: f64 = frame
                .iter()
                .enumerate()
                .map(|(bin, &m)| m as f64 * stft.bin_frequency(bin, sample_rate) as f64)
                .sum();
            sum += weighted / total;
        }
    }
    (sum / frames.len() as f64) as f32
}

fn rms(samples: &[f32]) -> f32 {
    let sum_sq: f64 = samples.iter().map(|&x| x as f64 * x as f64).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Framewise zero-crossing rate over the raw samples, same frame/hop grid
/// as the spectral analysis.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    let mut sum = 0.0f64;
    let mut frames = 0usize;
    let mut start = 0usize;

    loop {
        let end = (start + N_FFT).min(samples.len());
        let frame = &samples[start..end];
        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        sum += crossings as f64 / frame.len() as f64;
        frames += 1;

        if end == samples.len() {
            break;
        }
        start += HOP_LENGTH;
    }

    (sum / frames as f64) as f32
}
