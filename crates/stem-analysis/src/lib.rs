//! Quality analysis for separated audio stems.
//!
//! Computes per-stem spectral statistics against the original mix and turns
//! them into a bleed assessment via a fixed decision table. No I/O here:
//! callers hand in raw samples, this crate hands back numbers and verdicts.

pub mod bleed;
pub mod metrics;
pub mod report;
pub mod stft;

pub use bleed::{classify, BleedAssessment, BleedLabel, StemKind};
pub use metrics::{compute, QualityMetrics, HOP_LENGTH, N_FFT};
pub use report::quality_report;
pub use stft::MagnitudeStft;

/// Errors from stem analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("degenerate signal: {0}")]
    DegenerateSignal(String),
    #[error("FFT failed: {0}")]
    Fft(String),
}

pub type Result<T> = std::result::Result<T, Error>;
