//! TOML-file-backed camera registry
//!
//! Fleet file format:
//!
//! ```toml
//! [[cameras]]
//! camera_id = "front-door"
//! stream_url = "rtsp://192.168.1.10:554/stream1"
//! username = "viewer"
//! password = "s3cret"
//! detection_enabled = true
//! recording_enabled = true
//!
//! [cameras.detection]
//! min_area = 5000
//! cooldown_secs = 30
//! ```
//!
//! The `[cameras.detection]` table is optional; absent fields keep the
//! engine defaults.

use super::types::{CameraRecord, DetectionConfig};
use super::CameraRegistry;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FleetFile {
    #[serde(default)]
    cameras: Vec<FleetEntry>,
}

#[derive(Debug, Deserialize)]
struct FleetEntry {
    camera_id: String,
    stream_url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_true")]
    detection_enabled: bool,
    #[serde(default = "default_true")]
    recording_enabled: bool,
    #[serde(default)]
    detection: DetectionConfig,
}

fn default_true() -> bool {
    true
}

/// Static fleet loaded once at startup. Real deployments substitute their
/// own registry through the trait.
pub struct FileCameraRegistry {
    cameras: Vec<CameraRecord>,
    configs: HashMap<String, DetectionConfig>,
}

impl FileCameraRegistry {
    /// Load and validate a fleet file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Configuration(format!("cannot read fleet file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse a fleet definition. Duplicate camera ids and invalid detection
    /// tuning are rejected here, before any worker starts.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let fleet: FleetFile = toml::from_str(raw)
            .map_err(|e| Error::Configuration(format!("fleet file parse error: {}", e)))?;

        let mut cameras = Vec::with_capacity(fleet.cameras.len());
        let mut configs = HashMap::new();
        for entry in fleet.cameras {
            if entry.camera_id.trim().is_empty() {
                return Err(Error::Configuration("camera_id must not be empty".to_string()));
            }
            if configs.contains_key(&entry.camera_id) {
                return Err(Error::Configuration(format!(
                    "duplicate camera_id in fleet file: {}",
                    entry.camera_id
                )));
            }
            entry.detection.validate()?;
            cameras.push(CameraRecord {
                camera_id: entry.camera_id.clone(),
                stream_url: entry.stream_url,
                username: entry.username,
                password: entry.password,
                detection_enabled: entry.detection_enabled,
                recording_enabled: entry.recording_enabled,
            });
            configs.insert(entry.camera_id, entry.detection);
        }
        Ok(Self { cameras, configs })
    }

    /// Build a registry from in-memory records (test wiring).
    pub fn from_records(records: Vec<(CameraRecord, DetectionConfig)>) -> Self {
        let mut cameras = Vec::with_capacity(records.len());
        let mut configs = HashMap::new();
        for (record, config) in records {
            configs.insert(record.camera_id.clone(), config);
            cameras.push(record);
        }
        Self { cameras, configs }
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[async_trait]
impl CameraRegistry for FileCameraRegistry {
    async fn active_cameras(&self) -> Result<Vec<CameraRecord>> {
        Ok(self.cameras.clone())
    }

    async fn detection_config(&self, camera_id: &str) -> Result<DetectionConfig> {
        self.configs
            .get(camera_id)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown camera: {}", camera_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET: &str = r#"
        [[cameras]]
        camera_id = "front-door"
        stream_url = "rtsp://192.168.1.10:554/stream1"
        username = "viewer"
        password = "s3cret"

        [cameras.detection]
        min_area = 5000
        cooldown_secs = 30

        [[cameras]]
        camera_id = "yard"
        stream_url = "rtsp://192.168.1.11:554/stream1"
        detection_enabled = false
    "#;

    #[tokio::test]
    async fn parses_fleet_with_overrides() {
        let registry = FileCameraRegistry::from_toml_str(FLEET).unwrap();
        let cameras = registry.active_cameras().await.unwrap();
        assert_eq!(cameras.len(), 2);
        assert!(cameras[0].detection_enabled);
        assert!(!cameras[1].detection_enabled);

        let front = registry.detection_config("front-door").await.unwrap();
        assert_eq!(front.min_area, 5000);
        assert_eq!(front.cooldown_secs, 30);
        // untouched fields keep defaults
        assert_eq!(front.min_consecutive_frames, 2);

        let yard = registry.detection_config("yard").await.unwrap();
        assert_eq!(yard.min_area, 3000);
    }

    #[tokio::test]
    async fn unknown_camera_is_configuration_error() {
        let registry = FileCameraRegistry::from_toml_str(FLEET).unwrap();
        let err = registry.detection_config("nope").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn duplicate_camera_id_rejected() {
        let raw = r#"
            [[cameras]]
            camera_id = "a"
            stream_url = "rtsp://h/1"

            [[cameras]]
            camera_id = "a"
            stream_url = "rtsp://h/2"
        "#;
        assert!(FileCameraRegistry::from_toml_str(raw).is_err());
    }

    #[test]
    fn invalid_detection_tuning_rejected() {
        let raw = r#"
            [[cameras]]
            camera_id = "a"
            stream_url = "rtsp://h/1"

            [cameras.detection]
            frame_rate = 0
        "#;
        assert!(FileCameraRegistry::from_toml_str(raw).is_err());
    }

    #[test]
    fn empty_fleet_parses() {
        let registry = FileCameraRegistry::from_toml_str("").unwrap();
        assert!(registry.is_empty());
    }
}
