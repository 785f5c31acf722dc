//! CameraRegistry - Fleet Data Collaborator
//!
//! ## Responsibilities
//!
//! - Collaborator interface the engine pulls camera fleet data from
//! - Camera record + per-camera detection tuning types
//! - Bundled TOML-file-backed implementation for the binary and tests
//!
//! Camera CRUD itself lives outside the engine; anything that can answer
//! these two queries can drive it.

mod file;
mod types;

pub use file::FileCameraRegistry;
pub use types::{CameraRecord, DetectionConfig};

use crate::error::Result;
use async_trait::async_trait;

/// Fleet data source consumed by the worker registry.
#[async_trait]
pub trait CameraRegistry: Send + Sync {
    /// All provisioned cameras with their enablement flags. Filtering by
    /// `detection_enabled` is the caller's job.
    async fn active_cameras(&self) -> Result<Vec<CameraRecord>>;

    /// Detection tuning for one camera. Unknown camera is a configuration
    /// error, not a default.
    async fn detection_config(&self, camera_id: &str) -> Result<DetectionConfig>;
}
