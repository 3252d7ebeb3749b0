//! The external separation collaborator.
//!
//! Separation itself is opaque to the service: anything that turns an input
//! file into named stem files behind [`Separator`] will do. The shipped
//! implementation shells out to the `demucs` command-line frontend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Stems produced by the 4-stem demucs models, in output order.
pub const CANONICAL_STEMS: [&str; 4] = ["drums", "bass", "other", "vocals"];

/// Default timeout for one separation run. Separation takes 20-120s
/// depending on audio length.
pub const DEFAULT_SEPARATION_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("separation failed: {0}")]
    Process(String),
    #[error("separation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("separator wrote no output for stem {0}")]
    MissingStem(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// `separate(input, output_dir)` returns the stems it produced, in the
/// order it produced them. Stem names are open strings; richer models may
/// return more than the canonical four.
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> std::result::Result<Vec<(String, PathBuf)>, SeparationError>;
}

/// Runs the `demucs` CLI as a subprocess and collects the stem WAVs it
/// writes under `<output_dir>/<model>/<track>/`.
pub struct DemucsCommand {
    binary: PathBuf,
    model: String,
    timeout: Duration,
}

impl DemucsCommand {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            timeout: DEFAULT_SEPARATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Separator for DemucsCommand {
    async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> std::result::Result<Vec<(String, PathBuf)>, SeparationError> {
        let run = tokio::process::Command::new(&self.binary)
            .arg("-n")
            .arg(&self.model)
            .arg("-o")
            .arg(output_dir)
            .arg(input)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| SeparationError::TimedOut(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SeparationError::Process(stderr.trim().to_string()));
        }

        let track = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                SeparationError::Process(format!("input path has no file stem: {}", input.display()))
            })?;
        let stem_dir = output_dir.join(&self.model).join(track);

        let mut stems = Vec::with_capacity(CANONICAL_STEMS.len());
        for name in CANONICAL_STEMS {
            let path = stem_dir.join(format!("{name}.wav"));
            if !path.is_file() {
                return Err(SeparationError::MissingStem(name.to_string()));
            }
            stems.push((name.to_string(), path));
        }
        Ok(stems)
    }
}
