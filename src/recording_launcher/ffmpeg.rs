//! ffmpeg mp4 capture
//!
//! One child process per job: ffmpeg reads the stream, transcodes with a
//! hard `-t` duration cap, and writes an mp4 under the per-camera directory.
//! The wait is bounded by `duration + grace` so a hung encoder can never
//! pin a camera's recording flag forever.

use super::{CompletedRecording, RecordingJob, RecordingLauncher};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Extra wait beyond the requested duration before the process is killed
const GRACE: Duration = Duration::from_secs(30);

/// Outputs at or below this are truncated-connection artifacts, not
/// recordings
const MIN_VIABLE_FILE_BYTES: u64 = 1024;

/// Captures bounded mp4 clips via an external ffmpeg process.
pub struct FfmpegRecordingLauncher {
    ffmpeg_bin: String,
    base_dir: PathBuf,
    grace: Duration,
    min_file_size: u64,
}

impl FfmpegRecordingLauncher {
    pub fn new(ffmpeg_bin: String, base_dir: PathBuf) -> Self {
        Self {
            ffmpeg_bin,
            base_dir,
            grace: GRACE,
            min_file_size: MIN_VIABLE_FILE_BYTES,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ffmpeg_bin.clone(), config.recordings_dir.clone())
    }

    #[cfg(test)]
    fn with_limits(mut self, grace: Duration, min_file_size: u64) -> Self {
        self.grace = grace;
        self.min_file_size = min_file_size;
        self
    }

    fn build_args(&self, job: &RecordingJob, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if job.stream_url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".into(), "tcp".into()]);
        }
        args.extend([
            "-i".into(),
            job.stream_url.clone(),
            "-t".into(),
            job.duration_secs.to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-r".into(),
            job.frame_rate.to_string(),
            "-preset".into(),
            "ultrafast".into(),
            "-crf".into(),
            "25".into(),
            "-avoid_negative_ts".into(),
            "make_zero".into(),
            "-fflags".into(),
            "+genpts".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-f".into(),
            "mp4".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }

    /// Exit 0 is not enough: the file must exist and exceed the viable
    /// minimum (strictly — a file of exactly the minimum is still a
    /// truncated-connection artifact). Too-small files are deleted here.
    async fn validate_output(&self, path: &Path) -> Result<u64> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > self.min_file_size => Ok(meta.len()),
            Ok(meta) => {
                Self::discard(path).await;
                Err(Error::Encoding(format!(
                    "output too small ({} bytes): {}",
                    meta.len(),
                    path.display()
                )))
            }
            Err(_) => Err(Error::Encoding(format!(
                "output file missing: {}",
                path.display()
            ))),
        }
    }

    async fn discard(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = %path.display(), error = %e, "cannot delete partial recording");
            }
        }
    }
}

#[async_trait]
impl RecordingLauncher for FfmpegRecordingLauncher {
    async fn launch(&self, job: &RecordingJob) -> Result<CompletedRecording> {
        let dir = self.base_dir.join("videos").join(&job.camera_id);
        tokio::fs::create_dir_all(&dir).await?;
        let prefix = if job.triggered_by_motion {
            "motion"
        } else {
            "manual"
        };
        let file_path = dir.join(format!(
            "{}_{}.mp4",
            prefix,
            Local::now().format("%Y%m%d_%H%M%S")
        ));

        tracing::debug!(
            camera_id = %job.camera_id,
            file = %file_path.display(),
            duration = job.duration_secs,
            "recording started"
        );
        let started = Instant::now();
        // kill_on_drop: dropping the timed-out wait below reaps the child
        let child = Command::new(&self.ffmpeg_bin)
            .args(self.build_args(job, &file_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Encoding(format!("ffmpeg spawn failed: {}", e)))?;

        let bound = Duration::from_secs(job.duration_secs) + self.grace;
        match tokio::time::timeout(bound, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    Self::discard(&file_path).await;
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
                    let tail = tail.into_iter().rev().collect::<Vec<_>>().join(" | ");
                    return Err(Error::Encoding(format!(
                        "ffmpeg exited with {}: {}",
                        output.status, tail
                    )));
                }
                let file_size_bytes = self.validate_output(&file_path).await?;
                Ok(CompletedRecording {
                    file_path,
                    file_size_bytes,
                    actual_duration_secs: started.elapsed().as_secs(),
                })
            }
            Ok(Err(e)) => {
                Self::discard(&file_path).await;
                Err(Error::Encoding(format!("ffmpeg wait failed: {}", e)))
            }
            Err(_) => {
                Self::discard(&file_path).await;
                Err(Error::Timeout(format!(
                    "recording for camera {} exceeded its {}s bound",
                    job.camera_id,
                    bound.as_secs()
                )))
            }
        }
    }
}
