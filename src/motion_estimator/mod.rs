//! MotionEstimator - Frame-Diff Motion Decision
//!
//! ## Responsibilities
//!
//! - Per-frame boolean motion decision against the previous frame
//! - Pipeline: Gaussian blur -> absolute difference -> binary threshold ->
//!   3x3 dilation -> connected-region area test
//!
//! The estimator owns the previous-frame baseline. The first observation
//! after construction or `reset()` caches the baseline and reports no
//! motion, so a reconnect can never fire a spurious trigger by diffing
//! against a stale scene.

use crate::camera_registry::DetectionConfig;
use crate::frame_source::Frame;
use image::GrayImage;

/// Gaussian sigma applied before differencing, tuned for the default
/// 640x480 analysis geometry
const BLUR_SIGMA: f32 = 2.0;

/// Dilation passes over the binary mask (merges nearby motion blobs)
const DILATE_ITERATIONS: usize = 2;

pub struct MotionEstimator {
    /// Intensity delta (0-255) above which a pixel counts as changed
    sensitivity: u8,
    /// Minimum connected-region area in pixels
    min_area: u32,
    prev: Option<GrayImage>,
    last_area: u32,
}

impl MotionEstimator {
    pub fn new(sensitivity: u8, min_area: u32) -> Self {
        Self {
            sensitivity,
            min_area,
            prev: None,
            last_area: 0,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.sensitivity, config.min_area)
    }

    /// Drop the baseline. Call after a source reconnect.
    pub fn reset(&mut self) {
        self.prev = None;
        self.last_area = 0;
    }

    /// Largest changed region seen by the most recent `observe` call
    /// (0 when there was no baseline). Debug aid only.
    pub fn last_area(&self) -> u32 {
        self.last_area
    }

    /// Decide whether `frame` contains significant motion relative to the
    /// previously observed frame. Always advances the baseline.
    pub fn observe(&mut self, frame: &Frame) -> bool {
        self.last_area = 0;
        let Some(raw) = GrayImage::from_raw(frame.width, frame.height, frame.data.clone()) else {
            // length mismatch; keep the old baseline rather than poisoning it
            return false;
        };
        let current = image::imageops::blur(&raw, BLUR_SIGMA);

        let Some(prev) = self.prev.take() else {
            self.prev = Some(current);
            return false;
        };
        if prev.dimensions() != current.dimensions() {
            // geometry changed under us; treat like a reconnect
            self.prev = Some(current);
            return false;
        }

        let width = frame.width as usize;
        let height = frame.height as usize;
        let mut mask: Vec<bool> = prev
            .as_raw()
            .iter()
            .zip(current.as_raw().iter())
            .map(|(a, b)| a.abs_diff(*b) > self.sensitivity)
            .collect();
        self.prev = Some(current);

        for _ in 0..DILATE_ITERATIONS {
            mask = dilate(&mask, width, height);
        }

        self.last_area = largest_region(&mut mask, width, height);
        self.last_area >= self.min_area
    }
}

/// 3x3 binary dilation.
fn dilate(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            if !mask[y * width + x] {
                continue;
            }
            let x0 = x.saturating_sub(1);
            let y0 = y.saturating_sub(1);
            let x1 = (x + 1).min(width - 1);
            let y1 = (y + 1).min(height - 1);
            for ny in y0..=y1 {
                for nx in x0..=x1 {
                    out[ny * width + nx] = true;
                }
            }
        }
    }
    out
}

/// Largest 4-connected region area, in pixels. Consumes the mask (visited
/// pixels are cleared in place).
fn largest_region(mask: &mut [bool], width: usize, height: usize) -> u32 {
    let mut largest = 0u32;
    let mut stack: Vec<usize> = Vec::new();
    for start in 0..mask.len() {
        if !mask[start] {
            continue;
        }
        mask[start] = false;
        stack.push(start);
        let mut area = 0u32;
        while let Some(idx) = stack.pop() {
            area += 1;
            let x = idx % width;
            let y = idx / width;
            if x > 0 && mask[idx - 1] {
                mask[idx - 1] = false;
                stack.push(idx - 1);
            }
            if x + 1 < width && mask[idx + 1] {
                mask[idx + 1] = false;
                stack.push(idx + 1);
            }
            if y > 0 && mask[idx - width] {
                mask[idx - width] = false;
                stack.push(idx - width);
            }
            if y + 1 < height && mask[idx + width] {
                mask[idx + width] = false;
                stack.push(idx + width);
            }
        }
        largest = largest.max(area);
    }
    largest
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 160;
    const H: u32 = 120;

    fn flat(value: u8) -> Frame {
        Frame::filled(W, H, value)
    }

    /// Uniform background with one filled rectangle.
    fn with_rect(bg: u8, value: u8, x: u32, y: u32, w: u32, h: u32) -> Frame {
        let mut frame = Frame::filled(W, H, bg);
        for ry in y..y + h {
            for rx in x..x + w {
                frame.data[(ry * W + rx) as usize] = value;
            }
        }
        frame
    }

    #[test]
    fn first_observation_is_never_motion() {
        let mut est = MotionEstimator::new(25, 1);
        assert!(!est.observe(&with_rect(0, 255, 10, 10, 60, 60)));
    }

    #[test]
    fn identical_frames_are_still() {
        let mut est = MotionEstimator::new(25, 1);
        est.observe(&flat(128));
        assert!(!est.observe(&flat(128)));
        assert_eq!(est.last_area(), 0);
    }

    #[test]
    fn large_blob_is_motion() {
        let mut est = MotionEstimator::new(25, 500);
        est.observe(&flat(0));
        assert!(est.observe(&with_rect(0, 255, 40, 30, 40, 40)));
        assert!(est.last_area() >= 500);
    }

    #[test]
    fn small_blob_is_below_min_area() {
        let mut est = MotionEstimator::new(25, 500);
        est.observe(&flat(0));
        assert!(!est.observe(&with_rect(0, 255, 40, 30, 10, 10)));
    }

    #[test]
    fn subtle_change_is_below_sensitivity() {
        let mut est = MotionEstimator::new(25, 100);
        est.observe(&flat(100));
        // delta of 10 never crosses the 25-step threshold
        assert!(!est.observe(&with_rect(100, 110, 40, 30, 60, 60)));
    }

    #[test]
    fn baseline_advances_every_frame() {
        let mut est = MotionEstimator::new(25, 500);
        est.observe(&flat(0));
        let moved = with_rect(0, 255, 40, 30, 40, 40);
        assert!(est.observe(&moved));
        // same scene again: diff is now against the moved frame
        assert!(!est.observe(&moved));
    }

    #[test]
    fn reset_clears_baseline() {
        let mut est = MotionEstimator::new(25, 500);
        est.observe(&flat(0));
        est.reset();
        // would be motion against the old baseline, but it is gone
        assert!(!est.observe(&with_rect(0, 255, 40, 30, 40, 40)));
    }

    #[test]
    fn nearby_blobs_merge_into_one_region() {
        // two 20x20 blobs, 3px apart: even with the blur fringe and two
        // dilation passes, a lone blob stays under ~900px; only the merged
        // region crosses 1000px
        let mut est = MotionEstimator::new(25, 1000);
        est.observe(&flat(0));
        let mut frame = with_rect(0, 255, 40, 30, 20, 20);
        for ry in 30..50 {
            for rx in 63..83 {
                frame.data[(ry * W + rx) as usize] = 255;
            }
        }
        assert!(est.observe(&frame));
    }

    #[test]
    fn largest_region_spans_wrapped_rows_is_not_connected() {
        // pixels at the end of one row and start of the next are not
        // neighbors even though their indices are adjacent
        let mut mask = vec![false; 16];
        mask[3] = true; // (3,0) of a 4x4 grid
        mask[4] = true; // (0,1)
        assert_eq!(largest_region(&mut mask, 4, 4), 1);
    }
}
