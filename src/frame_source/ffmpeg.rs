//! ffmpeg-backed frame source
//!
//! Decoding stays in a child process: ffmpeg connects to the stream, scales
//! every frame to the analysis geometry, caps the rate with an `fps` filter,
//! and writes raw 8-bit grayscale planes to stdout. Reading then reduces to
//! `read_exact(width * height)` per frame, and the `fps` filter paces the
//! worker loop without any sleep-polling.

use super::{Frame, FrameSource, FrameSourceFactory};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

/// Lines of child stderr kept for diagnostics
const STDERR_KEEP_LINES: usize = 8;

/// Opens ffmpeg-decoded sources.
pub struct FfmpegSourceFactory {
    ffmpeg_bin: String,
    width: u32,
    height: u32,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl FfmpegSourceFactory {
    pub fn new(
        ffmpeg_bin: String,
        width: u32,
        height: u32,
        open_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg_bin,
            width,
            height,
            open_timeout,
            read_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ffmpeg_bin.clone(),
            config.analysis_width,
            config.analysis_height,
            Duration::from_secs(config.open_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )
    }

    /// Check that the configured ffmpeg binary runs; returns its version line.
    pub async fn check_ffmpeg(&self) -> Result<String> {
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Configuration(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Configuration(
                "ffmpeg version check failed".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }

    fn build_args(&self, stream_url: &str, frame_rate: u32) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        // TCP avoids the packet loss that makes UDP RTSP decode garbage frames
        if stream_url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".into(), "tcp".into()]);
        }
        // lavfi:<graph> feeds a synthetic pattern, used for smoke tests
        // without a camera (e.g. lavfi:testsrc=size=640x480:rate=15)
        let input = match stream_url.strip_prefix("lavfi:") {
            Some(graph) => {
                args.extend(["-f".into(), "lavfi".into()]);
                graph.to_string()
            }
            None => stream_url.to_string(),
        };
        args.extend([
            "-i".into(),
            input,
            "-an".into(),
            "-vf".into(),
            format!("scale={}:{},fps={}", self.width, self.height, frame_rate),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "gray".into(),
            "-loglevel".into(),
            "error".into(),
            "-".into(),
        ]);
        args
    }
}

#[async_trait]
impl FrameSourceFactory for FfmpegSourceFactory {
    async fn open(
        &self,
        camera_id: &str,
        stream_url: &str,
        frame_rate: u32,
    ) -> Result<Box<dyn FrameSource>> {
        // kill_on_drop: an abandoned source must never leak a decoder process
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(self.build_args(stream_url, frame_rate))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Connection(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stderr not captured".to_string()))?;

        // Drain stderr continuously so the child can never block on a full
        // pipe; keep the tail for error messages.
        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        let drain = diagnostics.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut tail = drain.lock().unwrap_or_else(|p| p.into_inner());
                if tail.len() >= STDERR_KEEP_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
        });

        let mut source = FfmpegFrameSource {
            camera_id: camera_id.to_string(),
            child,
            stdout,
            width: self.width,
            height: self.height,
            read_timeout: self.read_timeout,
            diagnostics,
            pending: None,
            closed: false,
        };

        // First-frame probe: a spawned child proves nothing about the
        // stream, a frame on stdout does.
        match tokio::time::timeout(self.open_timeout, source.read_next()).await {
            Ok(Ok(Some(frame))) => {
                source.pending = Some(frame);
                Ok(Box::new(source))
            }
            Ok(Ok(None)) => {
                let detail = source.diagnostics_tail();
                source.close().await;
                Err(Error::Connection(format!(
                    "stream ended before the first frame: {}",
                    detail
                )))
            }
            Ok(Err(e)) => {
                source.close().await;
                Err(e)
            }
            Err(_) => {
                let detail = source.diagnostics_tail();
                source.close().await;
                Err(Error::Connection(format!(
                    "no frame within open timeout ({:?}): {}",
                    self.open_timeout, detail
                )))
            }
        }
    }
}

/// One live ffmpeg decode pipe.
struct FfmpegFrameSource {
    camera_id: String,
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    read_timeout: Duration,
    diagnostics: Arc<Mutex<Vec<String>>>,
    /// Frame captured by the open probe, handed to the first read
    pending: Option<Frame>,
    closed: bool,
}

impl FfmpegFrameSource {
    fn diagnostics_tail(&self) -> String {
        let tail = self
            .diagnostics
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if tail.is_empty() {
            "(no ffmpeg output)".to_string()
        } else {
            tail.join(" | ")
        }
    }

    async fn read_next(&mut self) -> Result<Option<Frame>> {
        let mut buf = vec![0u8; (self.width * self.height) as usize];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => Ok(Some(Frame::new(self.width, self.height, buf))),
            // A cleanly closed pipe (possibly mid-frame) is end of stream
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(Error::Connection(format!(
                "frame read failed for {}: {}",
                self.camera_id, e
            ))),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match tokio::time::timeout(self.read_timeout, self.read_next()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Connection(format!(
                "no frame within read timeout ({:?}): {}",
                self.read_timeout,
                self.diagnostics_tail()
            ))),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Explicit kill + reap; kill_on_drop only covers the drop path
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(camera_id = %self.camera_id, error = %e, "ffmpeg already gone");
        }
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> FfmpegSourceFactory {
        FfmpegSourceFactory::new(
            "ffmpeg".to_string(),
            64,
            48,
            Duration::from_secs(10),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn rtsp_urls_get_tcp_transport() {
        let args = factory().build_args("rtsp://cam.local/stream1", 15);
        assert_eq!(args[0], "-rtsp_transport");
        assert_eq!(args[1], "tcp");
        assert!(args.contains(&"scale=64:48,fps=15".to_string()));
        assert!(args.contains(&"rawvideo".to_string()));
        assert!(args.contains(&"gray".to_string()));
    }

    #[test]
    fn non_rtsp_urls_skip_transport_flag() {
        let args = factory().build_args("/tmp/clip.mp4", 5);
        assert_ne!(args[0], "-rtsp_transport");
        assert_eq!(args[0], "-i");
    }

    #[test]
    fn lavfi_inputs_get_format_flag() {
        let args = factory().build_args("lavfi:testsrc=size=64x48:rate=5", 5);
        let f_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_pos + 1], "lavfi");
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i_pos + 1], "testsrc=size=64x48:rate=5");
    }

    // Needs ffmpeg on PATH; run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn reads_frames_from_synthetic_source() {
        let factory = factory();
        let mut source = factory
            .open("test-cam", "lavfi:testsrc=size=64x48:rate=5", 5)
            .await
            .expect("lavfi open");
        let frame = source.read_frame().await.expect("read").expect("frame");
        assert_eq!(frame.data.len(), 64 * 48);
        source.close().await;
    }
}
