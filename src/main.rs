//! camsentry - fleet motion detection and recording daemon
//!
//! Wires the bundled collaborators (TOML fleet registry, ffmpeg frame
//! source, ffmpeg launcher, JSONL journal) around the worker registry,
//! starts every detection-enabled camera, and runs until SIGINT.

use anyhow::Context;
use camsentry::camera_registry::FileCameraRegistry;
use camsentry::frame_source::FfmpegSourceFactory;
use camsentry::recording_launcher::FfmpegRecordingLauncher;
use camsentry::recording_store::JsonlRecordingStore;
use camsentry::{AppConfig, WorkerRegistry};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "camsentry", version, about = "IP camera motion detection and recording")]
struct Cli {
    /// Camera fleet file (TOML); overrides CAMSENTRY_CAMERAS_FILE
    #[arg(long)]
    cameras_file: Option<PathBuf>,

    /// Base directory for clips and the journal; overrides CAMSENTRY_RECORDINGS_DIR
    #[arg(long)]
    recordings_dir: Option<PathBuf>,

    /// ffmpeg binary; overrides CAMSENTRY_FFMPEG_BIN
    #[arg(long)]
    ffmpeg_bin: Option<String>,

    /// Record this camera for its configured duration, then exit
    #[arg(long, value_name = "CAMERA_ID")]
    record_now: Option<String>,

    /// Duration override in seconds for --record-now
    #[arg(long, requires = "record_now")]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camsentry=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::default();
    if let Some(path) = cli.cameras_file {
        config.cameras_file = path;
    }
    if let Some(path) = cli.recordings_dir {
        config.recordings_dir = path;
    }
    if let Some(bin) = cli.ffmpeg_bin {
        config.ffmpeg_bin = bin;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cameras_file = %config.cameras_file.display(),
        recordings_dir = %config.recordings_dir.display(),
        "camsentry starting"
    );

    let sources = Arc::new(FfmpegSourceFactory::from_config(&config));
    let version = sources
        .check_ffmpeg()
        .await
        .context("ffmpeg is required for frame decoding and recording")?;
    tracing::info!(ffmpeg = %version, "ffmpeg available");

    let cameras = FileCameraRegistry::load(&config.cameras_file)
        .await
        .with_context(|| format!("loading fleet file {}", config.cameras_file.display()))?;
    tracing::info!(cameras = cameras.len(), "fleet loaded");

    let launcher = Arc::new(FfmpegRecordingLauncher::from_config(&config));
    let store = Arc::new(JsonlRecordingStore::open(&config.recordings_dir).await?);
    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(cameras),
        sources,
        launcher,
        store,
    ));

    // one-shot manual recording mode
    if let Some(camera_id) = cli.record_now {
        let done = registry
            .record_now(&camera_id, cli.duration)
            .await
            .with_context(|| format!("recording camera {}", camera_id))?;
        tracing::info!(
            file = %done.file_path.display(),
            size = done.file_size_bytes,
            duration = done.actual_duration_secs,
            "manual recording finished"
        );
        return Ok(());
    }

    let summary = registry.start_all().await;
    if summary.applied == 0 && summary.errors.is_empty() {
        tracing::warn!("no detection-enabled cameras in the fleet file");
    }
    for failure in &summary.errors {
        tracing::warn!(camera_id = %failure.camera_id, message = %failure.message, "camera did not start");
    }

    // periodic status breadcrumb
    {
        let registry = Arc::clone(&registry);
        let interval = Duration::from_secs(config.status_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                let status = registry.status().await;
                tracing::info!(
                    running = status.running_workers,
                    recording = status.recording_cameras,
                    monitored = status.monitored_cameras.len(),
                    "status"
                );
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    registry.shutdown().await;
    Ok(())
}
