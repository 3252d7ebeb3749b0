use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use stemshed::job_system::{JobScheduler, JobStore};
use stemshed::separation::DemucsCommand;
use stemshed::telemetry;
use stemshed::web::{self, WebState};

/// The Stemshed separation service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory for uploads, stems, and job records
    #[arg(short, long)]
    state_dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of separation workers running at once
    #[arg(long, default_value = "4")]
    max_jobs: usize,

    /// Demucs executable invoked for separation
    #[arg(long, default_value = "demucs")]
    demucs_bin: PathBuf,

    /// Demucs model to use (htdemucs, htdemucs_ft, mdx_extra, ...)
    #[arg(long, default_value = "htdemucs")]
    model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init();

    // Determine state directory - default to persistent location
    let state_dir = cli.state_dir.unwrap_or_else(|| {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".local/share/stemshed")
        } else {
            PathBuf::from("stemshed-state")
        }
    });

    let uploads_dir = state_dir.join("uploads");
    let outputs_dir = state_dir.join("outputs");
    std::fs::create_dir_all(&uploads_dir).context("Failed to create uploads directory")?;
    std::fs::create_dir_all(&outputs_dir).context("Failed to create outputs directory")?;
    tracing::info!("Using state directory: {}", state_dir.display());

    let store = JobStore::new();
    let separator = Arc::new(DemucsCommand::new(cli.demucs_bin.clone(), cli.model.clone()));
    let scheduler = JobScheduler::new(store.clone(), separator, cli.model.clone(), cli.max_jobs);
    tracing::info!(
        "Separation backend: {} (model {}, up to {} concurrent jobs)",
        cli.demucs_bin.display(),
        cli.model,
        cli.max_jobs
    );

    let state = WebState {
        store,
        scheduler,
        uploads_dir,
        outputs_dir,
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, web::router(state))
        .await
        .context("Server error")?;

    Ok(())
}
