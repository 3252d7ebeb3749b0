//! Web endpoints for Stemshed.
//!
//! Thin HTTP layer over the job system: upload a track, start separation,
//! poll status, download stems. All job state lives in the store; handlers
//! only translate between HTTP and the core contracts.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::job_system::{Job, JobId, JobScheduler, JobStatus, JobStore};

/// Upload size cap. Full-length lossless tracks run large.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 5] = ["mp3", "wav", "m4a", "flac", "aac"];

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub store: JobStore,
    pub scheduler: JobScheduler,
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/api/upload", post(upload))
        .route("/api/separate/{job_id}", post(start_separation))
        .route("/api/status/{job_id}", get(job_status))
        .route("/api/download/{job_id}/{stem_name}", get(download_stem))
        .route("/api/jobs", get(list_jobs))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Serve root discovery endpoint
async fn serve_root() -> impl IntoResponse {
    let links = serde_json::json!({
        "name": "Stemshed",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "upload": "/api/upload",
            "jobs": "/api/jobs",
            "health": "/api/health",
        }
    });
    Json(links)
}

#[derive(Serialize)]
struct UploadResponse {
    job_id: String,
    filename: String,
    status: JobStatus,
}

/// Accept an audio upload and create a job for it
#[tracing::instrument(name = "http.upload", skip(state, multipart))]
async fn upload(
    State(state): State<WebState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("bad multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let raw_name = field.file_name().map(str::to_string).unwrap_or_default();
        if raw_name.is_empty() {
            return Err(Error::InvalidInput("no file selected".to_string()));
        }
        if !allowed_file(&raw_name) {
            return Err(Error::InvalidInput(format!(
                "invalid file type: {raw_name}"
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read upload: {e}")))?;
        if data.is_empty() {
            return Err(Error::InvalidInput("empty upload".to_string()));
        }

        // Stage to a temp file first so the job record only ever points at
        // a fully written upload
        let mut staged = tempfile::NamedTempFile::new_in(&state.uploads_dir)
            .map_err(|e| Error::Internal(format!("failed to stage upload: {e}")))?;
        staged
            .write_all(&data)
            .map_err(|e| Error::Internal(format!("failed to stage upload: {e}")))?;

        let filename = sanitize_filename(&raw_name);
        let job = state
            .store
            .create(&filename, &state.uploads_dir, &state.outputs_dir);
        staged
            .persist(&job.source_path)
            .map_err(|e| Error::Internal(format!("failed to store upload: {e}")))?;

        return Ok(Json(UploadResponse {
            job_id: job.job_id.as_str().to_string(),
            filename,
            status: JobStatus::Uploaded,
        }));
    }

    Err(Error::InvalidInput("no file provided".to_string()))
}

#[derive(Serialize)]
struct SeparateResponse {
    job_id: String,
    status: JobStatus,
    message: String,
}

/// Start the separation worker for an uploaded job
#[tracing::instrument(name = "http.separate", skip(state), fields(job.id = %job_id))]
async fn start_separation(
    State(state): State<WebState>,
    Path(job_id): Path<String>,
) -> Result<Json<SeparateResponse>> {
    let job_id = JobId::from(job_id);
    state.scheduler.submit(&job_id)?;

    Ok(Json(SeparateResponse {
        job_id: job_id.as_str().to_string(),
        status: JobStatus::Processing,
        message: "Separation started".to_string(),
    }))
}

#[derive(Serialize)]
struct StatusResponse {
    job_id: String,
    status: JobStatus,
    progress: f32,
    filename: String,
    stems: HashMap<String, PathBuf>,
    quality_metrics: HashMap<String, stem_analysis::QualityMetrics>,
    bleed_analysis: HashMap<String, stem_analysis::BleedAssessment>,
    error: Option<String>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id.as_str().to_string(),
            status: job.status,
            progress: job.progress,
            filename: job.filename,
            stems: job.stems,
            quality_metrics: job.metrics,
            bleed_analysis: job.bleed,
            error: job.error,
        }
    }
}

/// Get processing status for a job
#[tracing::instrument(name = "http.status", skip(state), fields(job.id = %job_id))]
async fn job_status(
    State(state): State<WebState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let job = state.store.get(&JobId::from(job_id))?;
    Ok(Json(job.into()))
}

/// Download a separated stem
#[tracing::instrument(
    name = "http.download",
    skip(state),
    fields(job.id = %job_id, stem.name = %stem_name)
)]
async fn download_stem(
    State(state): State<WebState>,
    Path((job_id, stem_name)): Path<(String, String)>,
) -> Result<Response> {
    let job = state.store.get(&JobId::from(job_id))?;
    if job.status != JobStatus::Completed {
        return Err(Error::NotReady(format!(
            "job {} is {}",
            job.job_id, job.status
        )));
    }

    let stem_path = job
        .stems
        .get(&stem_name)
        .ok_or_else(|| Error::NotFound(format!("stem {stem_name}")))?;

    let file = tokio::fs::File::open(stem_path)
        .await
        .map_err(|_| Error::NotFound(format!("stem file missing: {}", stem_path.display())))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let attachment_name = stem_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stem.wav");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{attachment_name}\""),
        )
        .body(body)
        .map_err(|e| Error::Internal(format!("failed to build response: {e}")))
}

#[derive(Serialize)]
struct JobSummary {
    job_id: String,
    filename: String,
    status: JobStatus,
    progress: f32,
}

#[derive(Serialize)]
struct JobsResponse {
    jobs: Vec<JobSummary>,
}

/// List all known jobs
#[tracing::instrument(name = "http.jobs.list", skip(state))]
async fn list_jobs(State(state): State<WebState>) -> impl IntoResponse {
    let jobs = state
        .store
        .list()
        .into_iter()
        .map(|job| JobSummary {
            job_id: job.job_id.as_str().to_string(),
            filename: job.filename,
            status: job.status,
            progress: job.progress,
        })
        .collect();

    Json(JobsResponse { jobs })
}

/// Health check endpoint
async fn health(State(state): State<WebState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "jobs": state.store.stats(),
    }))
}

fn allowed_file(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Strip any path components and unusual characters from an upload name.
fn sanitize_filename(name: &str) -> String {
    let base = std::path::Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::{SeparationError, Separator, CANONICAL_STEMS};
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::Request;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::f32::consts::PI;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const SAMPLE_RATE: u32 = 22_050;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn wav_spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        }
    }

    fn wav_bytes(samples: &[f32]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, wav_spec()).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// Writes one synthesized WAV per canonical stem into the output dir.
    struct StubSeparator;

    #[async_trait]
    impl Separator for StubSeparator {
        async fn separate(
            &self,
            _input: &std::path::Path,
            output_dir: &std::path::Path,
        ) -> std::result::Result<Vec<(String, PathBuf)>, SeparationError> {
            let mut stems = Vec::new();
            for (i, name) in CANONICAL_STEMS.iter().enumerate() {
                let path = output_dir.join(format!("{name}.wav"));
                let samples = sine(220.0 * (i + 1) as f32, 0.4, 8192);
                let mut writer = WavWriter::create(&path, wav_spec())
                    .map_err(|e| SeparationError::Process(e.to_string()))?;
                for s in samples {
                    writer
                        .write_sample(s)
                        .map_err(|e| SeparationError::Process(e.to_string()))?;
                }
                writer
                    .finalize()
                    .map_err(|e| SeparationError::Process(e.to_string()))?;
                stems.push((name.to_string(), path));
            }
            Ok(stems)
        }
    }

    fn setup_test_state() -> (WebState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let uploads_dir = temp_dir.path().join("uploads");
        let outputs_dir = temp_dir.path().join("outputs");
        std::fs::create_dir_all(&uploads_dir).unwrap();
        std::fs::create_dir_all(&outputs_dir).unwrap();

        let store = JobStore::new();
        let scheduler = JobScheduler::new(store.clone(), Arc::new(StubSeparator), "htdemucs", 4);

        let state = WebState {
            store,
            scheduler,
            uploads_dir,
            outputs_dir,
        };
        (state, temp_dir)
    }

    fn multipart_request(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "stemshed-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn response_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn upload_track(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(multipart_request(
                "/api/upload",
                "test_track.wav",
                &wav_bytes(&sine(440.0, 0.5, 16_384)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        json["job_id"].as_str().unwrap().to_string()
    }

    async fn wait_for_terminal(app: &Router, job_id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/status/{job_id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let json = response_json(response).await;
            match json["status"].as_str() {
                Some("completed") | Some("failed") => return json,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        panic!("job {job_id} did not reach a terminal state");
    }

    #[tokio::test]
    async fn upload_separate_poll_download_flow() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let job_id = upload_track(&app).await;

        // Freshly uploaded: no stems, no analysis
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/status/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["status"], "uploaded");
        assert_eq!(json["progress"], 0.0);
        assert!(json["stems"].as_object().unwrap().is_empty());

        // Kick off separation
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/separate/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = wait_for_terminal(&app, &job_id).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 1.0);
        assert_eq!(json["stems"].as_object().unwrap().len(), 4);
        assert_eq!(json["quality_metrics"].as_object().unwrap().len(), 4);
        assert_eq!(json["bleed_analysis"].as_object().unwrap().len(), 4);
        assert!(json["error"].is_null());

        // Download one stem
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/download/{job_id}/vocals"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-type").unwrap(), "audio/wav");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn upload_without_file_part_is_rejected() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let boundary = "stemshed-test-boundary";
        let body = format!("--{boundary}--\r\n");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("no file provided"));
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_extension() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let response = app
            .oneshot(multipart_request("/api/upload", "notes.txt", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("invalid file type"));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        for uri in [
            "/api/status/no-such-job",
            "/api/download/no-such-job/vocals",
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/separate/no-such-job")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_before_completion_is_a_conflict() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let job_id = upload_track(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/download/{job_id}/vocals"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn second_separate_call_is_a_conflict() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let job_id = upload_track(&app).await;

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/separate/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/separate/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn jobs_list_includes_uploaded_jobs() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let job_id = upload_track(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/jobs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        let jobs = json["jobs"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["job_id"], job_id.as_str());
        assert_eq!(jobs[0]["filename"], "test_track.wav");
        assert_eq!(jobs[0]["status"], "uploaded");
    }

    #[tokio::test]
    async fn health_reports_store_stats() {
        let (state, _temp_dir) = setup_test_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["jobs"]["total"], 0);
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("my song (live).mp3"), "my_song__live_.mp3");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("track.wav"), "track.wav");
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(allowed_file("song.MP3"));
        assert!(allowed_file("song.flac"));
        assert!(!allowed_file("song.ogg"));
        assert!(!allowed_file("song"));
    }
}
