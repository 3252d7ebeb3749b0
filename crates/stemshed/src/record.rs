//! Durable per-job result record.
//!
//! Written into the job's output directory on completion. This is the record
//! a downstream consumer reads after the in-memory job is gone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use stem_analysis::{BleedAssessment, QualityMetrics};

/// File name of the record inside a job's output directory.
pub const RECORD_FILENAME: &str = "separation_results.json";

/// Stem paths grouped by container format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StemPaths {
    pub wav: HashMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationRecord {
    pub input_file: PathBuf,
    pub output_directory: PathBuf,
    pub model_used: String,
    pub processing_time_seconds: f64,
    /// RFC 3339 completion time
    pub timestamp: String,
    pub stems: StemPaths,
    pub quality_metrics: HashMap<String, QualityMetrics>,
    pub bleed_analysis: HashMap<String, BleedAssessment>,
    pub quality_report: String,
}

impl SeparationRecord {
    /// Serialize to `separation_results.json` under `dir`, returning the
    /// written path.
    pub fn write(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(RECORD_FILENAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
