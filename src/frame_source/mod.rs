//! FrameSource - Live Stream Frame Acquisition
//!
//! ## Responsibilities
//!
//! - Abstraction over a live video stream connection yielding successive
//!   frames (single-channel intensity, fixed analysis geometry)
//! - ffmpeg-backed implementation (`ffmpeg`)
//!
//! Sources never retry internally. Open and read failures go straight to
//! the caller; retry policy belongs to the camera worker so it lives in
//! exactly one place.

mod ffmpeg;

pub use ffmpeg::FfmpegSourceFactory;

use crate::error::Result;
use async_trait::async_trait;

/// One decoded frame: an 8-bit grayscale plane at the analysis geometry.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major luma bytes, `width * height` long
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self { width, height, data }
    }

    /// Uniform frame, handy for scripted sources in tests.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(width, height, vec![value; (width * height) as usize])
    }
}

/// A live connection to one camera stream.
///
/// `read_frame` returns `Ok(Some(frame))` for the next frame in arrival
/// order, `Ok(None)` when the stream ended cleanly, and `Err` on a read
/// failure or per-read timeout.
#[async_trait]
pub trait FrameSource: Send {
    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Tear down the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens frame sources. The factory carries process-wide acquisition
/// settings (geometry, timeouts); the per-camera frame rate comes from the
/// camera's detection config.
#[async_trait]
pub trait FrameSourceFactory: Send + Sync {
    async fn open(
        &self,
        camera_id: &str,
        stream_url: &str,
        frame_rate: u32,
    ) -> Result<Box<dyn FrameSource>>;
}
