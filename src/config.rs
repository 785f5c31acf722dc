//! Application configuration
//!
//! Env-driven settings with hard defaults; per-camera detection tuning lives
//! in `camera_registry::DetectionConfig`, not here.

use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base directory for recorded clips (per-camera subdirs are created under
    /// `<recordings_dir>/videos/<camera_id>/`)
    pub recordings_dir: PathBuf,
    /// Camera fleet file (TOML) for the bundled file-backed registry
    pub cameras_file: PathBuf,
    /// ffmpeg binary (override for non-PATH installs)
    pub ffmpeg_bin: String,
    /// Analysis frame width (decoder scales every stream to this geometry)
    pub analysis_width: u32,
    /// Analysis frame height
    pub analysis_height: u32,
    /// First-frame probe timeout when opening a stream (seconds)
    pub open_timeout_secs: u64,
    /// Per-frame read timeout on an open stream (seconds)
    pub read_timeout_secs: u64,
    /// Interval between status log lines (seconds)
    pub status_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recordings_dir: std::env::var("CAMSENTRY_RECORDINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./recordings")),
            cameras_file: std::env::var("CAMSENTRY_CAMERAS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./cameras.toml")),
            ffmpeg_bin: std::env::var("CAMSENTRY_FFMPEG_BIN")
                .unwrap_or_else(|_| "ffmpeg".to_string()),
            analysis_width: std::env::var("CAMSENTRY_ANALYSIS_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(640),
            analysis_height: std::env::var("CAMSENTRY_ANALYSIS_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(480),
            open_timeout_secs: std::env::var("CAMSENTRY_OPEN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            read_timeout_secs: std::env::var("CAMSENTRY_READ_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            status_interval_secs: std::env::var("CAMSENTRY_STATUS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}
