//! Decoded video frame buffer
//!
//! Frames arrive from the upstream decoder as raw BGR24 byte buffers. The
//! type carries the monotonic timestamp and frame number alongside the
//! pixels so every downstream stage can log and associate by frame.

use crate::BoundingBox;
use image::GrayImage;
use thiserror::Error;

/// Errors raised when constructing a frame from a raw buffer
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer length {actual} does not match {width}x{height}x3 = {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
}

/// A decoded BGR24 frame with timing metadata
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Interleaved Blue-Green-Red bytes, row-major, no padding
    pub data: Vec<u8>,
    /// Monotonic timestamp in seconds
    pub timestamp: f64,
    /// Monotonically increasing frame number within the stream
    pub frame_number: u64,
}

impl Frame {
    /// Wrap a raw BGR24 buffer, validating its size
    pub fn from_bgr24(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: f64,
        frame_number: u64,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        })
    }

    /// Pixel area of the frame
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// BGR bytes of the pixel at `(x, y)`
    #[must_use]
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Convert to an 8-bit grayscale image using BT.601 luma weights
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        let mut gray = Vec::with_capacity(self.width as usize * self.height as usize);
        for px in self.data.chunks_exact(3) {
            let (b, g, r) = (f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            gray.push(luma.round().min(255.0) as u8);
        }
        // Buffer length is width*height by construction
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Copy the pixels inside `region` into a new buffer.
    ///
    /// The region is clipped to the frame first; returns `None` when nothing
    /// remains after clipping.
    #[must_use]
    pub fn crop(&self, region: BoundingBox) -> Option<(Vec<u8>, u32, u32)> {
        let r = region.clip(self.width, self.height)?;
        let (w, h) = (r.w as usize, r.h as usize);
        let mut out = Vec::with_capacity(w * h * 3);
        for row in 0..h {
            let y = r.y as usize + row;
            let start = (y * self.width as usize + r.x as usize) * 3;
            out.extend_from_slice(&self.data[start..start + w * 3]);
        }
        Some((out, r.w as u32, r.h as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, bgr: [u8; 3]) -> Frame {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Frame::from_bgr24(width, height, data, 0.0, 0).unwrap()
    }

    #[test]
    fn test_buffer_size_validation() {
        let err = Frame::from_bgr24(4, 4, vec![0u8; 10], 0.0, 0);
        assert!(matches!(err, Err(FrameError::BufferSize { .. })));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = Frame::from_bgr24(0, 4, vec![], 0.0, 0);
        assert!(matches!(err, Err(FrameError::EmptyDimensions { .. })));
    }

    #[test]
    fn test_grayscale_white() {
        let frame = solid_frame(4, 4, [255, 255, 255]);
        let gray = frame.to_gray();
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_grayscale_pure_blue() {
        // BT.601: blue contributes 0.114
        let frame = solid_frame(4, 4, [255, 0, 0]);
        let gray = frame.to_gray();
        assert_eq!(gray.get_pixel(2, 2)[0], 29);
    }

    #[test]
    fn test_crop_dimensions() {
        let frame = solid_frame(16, 16, [1, 2, 3]);
        let (data, w, h) = frame.crop(BoundingBox::new(4, 4, 8, 8)).unwrap();
        assert_eq!((w, h), (8, 8));
        assert_eq!(data.len(), 8 * 8 * 3);
        assert_eq!(&data[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_crop_clips_to_frame() {
        let frame = solid_frame(16, 16, [0, 0, 0]);
        let (_, w, h) = frame.crop(BoundingBox::new(12, 12, 10, 10)).unwrap();
        assert_eq!((w, h), (4, 4));
    }

    #[test]
    fn test_crop_outside_returns_none() {
        let frame = solid_frame(16, 16, [0, 0, 0]);
        assert!(frame.crop(BoundingBox::new(20, 20, 4, 4)).is_none());
    }
}
