use serde::{Deserialize, Serialize};

use crate::metrics::QualityMetrics;

/// Canonical stem category used to pick a classification rule.
///
/// Stem names travel as open strings end to end (richer models emit piano,
/// guitar, ...); anything outside the four canonical names falls back to
/// `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemKind {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl StemKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "vocals" => Self::Vocals,
            "drums" => Self::Drums,
            "bass" => Self::Bass,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Drums => "drums",
            Self::Bass => "bass",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for StemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality verdict for one stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BleedLabel {
    Good,
    BleedSuspected,
    Weak,
}

impl BleedLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::BleedSuspected => "bleed_suspected",
            Self::Weak => "weak",
        }
    }
}

impl std::fmt::Display for BleedLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label plus its fixed human-readable rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BleedAssessment {
    pub label: BleedLabel,
    pub note: String,
}

/// Classifies a stem from its metrics via a fixed decision table.
///
/// The thresholds are a deliberate heuristic, not a learned model; they are
/// reproduced exactly so verdicts stay stable across runs and versions.
pub fn classify(stem_name: &str, metrics: &QualityMetrics) -> BleedAssessment {
    let (label, note) = match StemKind::from_name(stem_name) {
        // Vocals sit high in the spectrum with moderate energy
        StemKind::Vocals => {
            if metrics.spectral_centroid_hz > 1500.0 && metrics.rms_energy > 0.01 {
                (BleedLabel::Good, "clean vocal separation")
            } else {
                (BleedLabel::BleedSuspected, "may contain instrumental bleed")
            }
        }
        // Drums carry high energy and a high zero-crossing rate
        StemKind::Drums => {
            if metrics.rms_energy > 0.02 && metrics.zero_crossing_rate > 0.1 {
                (BleedLabel::Good, "clean drum separation")
            } else {
                (BleedLabel::BleedSuspected, "may contain other instruments")
            }
        }
        // Bass lives low with decent energy
        StemKind::Bass => {
            if metrics.spectral_centroid_hz < 800.0 && metrics.rms_energy > 0.005 {
                (BleedLabel::Good, "clean bass separation")
            } else {
                (BleedLabel::BleedSuspected, "may contain mid-frequency bleed")
            }
        }
        StemKind::Other => {
            if metrics.rms_energy > 0.01 {
                (BleedLabel::Good, "contains remaining instruments")
            } else {
                (BleedLabel::Weak, "low energy, check separation")
            }
        }
    };

    BleedAssessment {
        label,
        note: note.to_string(),
    }
}
