//! Async Job System
//!
//! Job lifecycle for separation runs: clients submit a file, a background
//! worker separates it and scores each stem, and clients poll for progress
//! and results. Jobs live in a shared in-memory store; each dispatched job
//! is mutated by exactly one worker task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use stem_analysis::{classify, quality_report, BleedAssessment, QualityMetrics};

use crate::audio;
use crate::error::{Error, Result};
use crate::record::{SeparationRecord, StemPaths};
use crate::separation::Separator;

/// Unique identifier for a separation job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle state. Transitions are strictly linear:
/// Uploaded -> Processing -> Completed or Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One separation job.
///
/// `stems`, `metrics` and `bleed` stay empty until the job completes;
/// `error` is set exactly when the job failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f32,
    pub filename: String,
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub stems: HashMap<String, PathBuf>,
    pub metrics: HashMap<String, QualityMetrics>,
    pub bleed: HashMap<String, BleedAssessment>,
    pub error: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
}

impl Job {
    pub fn new(job_id: JobId, filename: String, source_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            job_id,
            status: JobStatus::Uploaded,
            progress: 0.0,
            filename,
            source_path,
            output_dir,
            stems: HashMap::new(),
            metrics: HashMap::new(),
            bleed: HashMap::new(),
            error: None,
            created_at: epoch_secs(),
            started_at: None,
            completed_at: None,
        }
    }

    fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(epoch_secs());
    }

    fn mark_completed(
        &mut self,
        stems: HashMap<String, PathBuf>,
        metrics: HashMap<String, QualityMetrics>,
        bleed: HashMap<String, BleedAssessment>,
    ) {
        self.stems = stems;
        self.metrics = metrics;
        self.bleed = bleed;
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.completed_at = Some(epoch_secs());
    }

    fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(epoch_secs());
    }

    /// Seconds since the worker picked the job up.
    pub fn duration_secs(&self) -> Option<u64> {
        self.started_at.map(|s| epoch_secs().saturating_sub(s))
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Job counts per status for monitoring
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct JobStoreStats {
    pub total: usize,
    pub uploaded: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Storage for separation jobs
///
/// The store is the single point of mutual exclusion: every read or write
/// of a job goes through it, and no caller ever observes a partially
/// written record.
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a new job at status Uploaded and return it.
    ///
    /// The upload lands at `<uploads_dir>/<job_id>_<filename>`; the job's
    /// stems go under `<outputs_dir>/<job_id>`, owned exclusively by this
    /// job's worker.
    pub fn create(&self, filename: &str, uploads_dir: &Path, outputs_dir: &Path) -> Job {
        let job_id = JobId::new();
        let source_path = uploads_dir.join(format!("{}_{}", job_id, filename));
        let output_dir = outputs_dir.join(job_id.as_str());
        let job = Job::new(job_id.clone(), filename.to_string(), source_path, output_dir);

        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job_id.as_str().to_string(), job.clone());

        tracing::info!(
            job.id = %job_id,
            job.filename = %filename,
            "Job created"
        );

        job
    }

    /// Get a snapshot of a job
    pub fn get(&self, job_id: &JobId) -> Result<Job> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_id.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }

    /// Apply a single synchronized mutation to a job. Used only by the
    /// worker owning that job.
    pub fn update(&self, job_id: &JobId, mutate: impl FnOnce(&mut Job)) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        mutate(job);
        Ok(())
    }

    /// Atomically transition a job from Uploaded to Processing.
    ///
    /// Rejects any other starting state, so a job can never be dispatched
    /// twice.
    pub fn begin_processing(&self, job_id: &JobId) -> Result<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        if job.status != JobStatus::Uploaded {
            return Err(Error::InvalidState(format!(
                "job {} is {}, expected uploaded",
                job_id, job.status
            )));
        }
        job.mark_processing();

        tracing::info!(
            job.id = %job_id,
            job.filename = %job.filename,
            "Job started"
        );

        Ok(job.clone())
    }

    /// Advance a job's progress checkpoint. Progress never moves backwards.
    pub fn set_progress(&self, job_id: &JobId, progress: f32) -> Result<()> {
        self.update(job_id, |job| job.progress = job.progress.max(progress))
    }

    /// Mark a job as completed with its stems and analysis results
    pub fn mark_completed(
        &self,
        job_id: &JobId,
        stems: HashMap<String, PathBuf>,
        metrics: HashMap<String, QualityMetrics>,
        bleed: HashMap<String, BleedAssessment>,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        let duration = job.duration_secs();
        job.mark_completed(stems, metrics, bleed);

        tracing::info!(
            job.id = %job_id,
            job.duration_secs = ?duration,
            "Job completed successfully"
        );

        Ok(())
    }

    /// Mark a job as failed with a terminal error
    pub fn mark_failed(&self, job_id: &JobId, error: String) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        let duration = job.duration_secs();
        job.mark_failed(error.clone());

        tracing::error!(
            job.id = %job_id,
            job.duration_secs = ?duration,
            job.error = %error,
            "Job failed"
        );

        Ok(())
    }

    /// List all jobs
    pub fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().unwrap();
        jobs.values().cloned().collect()
    }

    /// Get job store statistics for monitoring
    pub fn stats(&self) -> JobStoreStats {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = JobStoreStats::default();

        for job in jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Uploaded => stats.uploaded += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        stats
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a completed pipeline hands back to the store.
struct PipelineOutput {
    stems: HashMap<String, PathBuf>,
    metrics: HashMap<String, QualityMetrics>,
    bleed: HashMap<String, BleedAssessment>,
}

/// Dispatches one background worker per submitted job.
///
/// Workers run separate -> analyze -> classify -> persist, reporting fixed
/// progress checkpoints along the way. A semaphore caps how many separation
/// pipelines run at once; submissions past the cap queue in order inside
/// their already-spawned tasks.
#[derive(Clone)]
pub struct JobScheduler {
    store: JobStore,
    separator: Arc<dyn Separator>,
    permits: Arc<Semaphore>,
    model: String,
}

impl JobScheduler {
    pub fn new(
        store: JobStore,
        separator: Arc<dyn Separator>,
        model: impl Into<String>,
        max_jobs: usize,
    ) -> Self {
        Self {
            store,
            separator,
            permits: Arc::new(Semaphore::new(max_jobs)),
            model: model.into(),
        }
    }

    /// Transition the job to Processing and start exactly one worker for it.
    ///
    /// Fails with `InvalidState` unless the job is currently Uploaded, so a
    /// running, completed or failed job can never be started again. Failed
    /// jobs are terminal; retrying means uploading a new job.
    pub fn submit(&self, job_id: &JobId) -> Result<()> {
        let job = self.store.begin_processing(job_id)?;

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_worker(job).await;
        });

        Ok(())
    }

    /// Worker boundary: every pipeline failure is caught here and turned
    /// into a Failed job, never a crashed task.
    async fn run_worker(self, job: Job) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                let _ = self
                    .store
                    .mark_failed(&job.job_id, "worker pool shut down".to_string());
                return;
            }
        };

        let job_id = job.job_id.clone();
        match self.run_pipeline(&job).await {
            Ok(output) => {
                let _ = self
                    .store
                    .mark_completed(&job_id, output.stems, output.metrics, output.bleed);
            }
            Err(e) => {
                let _ = self.store.mark_failed(&job_id, e.to_string());
            }
        }
    }

    async fn run_pipeline(&self, job: &Job) -> anyhow::Result<PipelineOutput> {
        let started = Instant::now();
        let job_id = &job.job_id;

        tokio::fs::create_dir_all(&job.output_dir).await?;
        self.store.set_progress(job_id, 0.1)?;

        // 1. External separation
        let stems = self
            .separator
            .separate(&job.source_path, &job.output_dir)
            .await?;
        self.store.set_progress(job_id, 0.8)?;

        // 2 + 3. Per-stem metrics and bleed classification. A failure on
        // any single stem fails the whole job; there is no partial-results
        // state.
        let (original, _) = audio::read_audio_mono(&job.source_path)?;

        let mut metrics = HashMap::new();
        let mut bleed = HashMap::new();
        let mut assessments = Vec::with_capacity(stems.len());

        for (name, path) in &stems {
            let (samples, sample_rate) = audio::read_audio_mono(path)?;
            let stem_metrics = stem_analysis::compute(&original, &samples, sample_rate)?;
            let assessment = classify(name, &stem_metrics);

            tracing::debug!(
                job.id = %job_id,
                stem.name = %name,
                stem.label = %assessment.label,
                stem.rms = stem_metrics.rms_energy,
                "Stem analyzed"
            );

            metrics.insert(name.clone(), stem_metrics);
            bleed.insert(name.clone(), assessment.clone());
            assessments.push((name.clone(), assessment));
        }
        self.store.set_progress(job_id, 0.9)?;

        // 4. Durable result record for downstream consumers
        let report = quality_report(assessments.iter().map(|(n, a)| (n.as_str(), a)));
        let elapsed = started.elapsed().as_secs_f64();
        let record = SeparationRecord {
            input_file: job.source_path.clone(),
            output_directory: job.output_dir.clone(),
            model_used: self.model.clone(),
            processing_time_seconds: (elapsed * 100.0).round() / 100.0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            stems: StemPaths {
                wav: stems.iter().cloned().collect(),
            },
            quality_metrics: metrics.clone(),
            bleed_analysis: bleed.clone(),
            quality_report: report,
        };
        record.write(&job.output_dir)?;

        Ok(PipelineOutput {
            stems: stems.into_iter().collect(),
            metrics,
            bleed,
        })
    }
}
