//! Frame preprocessing for YOLO inference
//!
//! Produces `(1, 3, S, S)` float tensors in `[0, 1]`: letterbox resize with
//! constant fill, BGR to RGB reorder, HWC to CHW transpose, batch axis.

use image::{imageops, RgbImage};
use ndarray::Array4;
use streamlens_common::{BoundingBox, Frame, Letterbox, LETTERBOX_FILL};
use tracing::{debug, warn};

/// A preprocessed full-frame tensor plus its letterbox parameters
pub struct Preprocessed {
    pub tensor: Array4<f32>,
    pub letterbox: Letterbox,
}

/// A preprocessed region tensor: letterbox parameters apply within the
/// region; `offset` maps region-local coordinates back into the full frame
/// and is never negative
pub struct RegionPreprocessed {
    pub tensor: Array4<f32>,
    pub letterbox: Letterbox,
    pub offset: (i32, i32),
}

/// Preprocess the whole frame for inference at `target` x `target`
#[must_use]
pub fn preprocess_frame(frame: &Frame, target: u32) -> Preprocessed {
    debug!(
        "preprocessing frame: {}x{} -> {target}x{target}",
        frame.width, frame.height
    );
    let (tensor, letterbox) = letterbox_tensor(&frame.data, frame.width, frame.height, target);
    Preprocessed { tensor, letterbox }
}

/// Crop `region` out of the frame and preprocess it for inference.
///
/// When the crop is empty the tensor is all zeros with an identity
/// letterbox; decoding it yields no detections.
#[must_use]
pub fn preprocess_region(frame: &Frame, region: BoundingBox, target: u32) -> RegionPreprocessed {
    match frame.crop(region) {
        Some((data, w, h)) => {
            debug!(
                "preprocessing region: bbox={:?} ({}x{}) -> {target}x{target}",
                region, w, h
            );
            let (tensor, letterbox) = letterbox_tensor(&data, w, h, target);
            RegionPreprocessed {
                tensor,
                letterbox,
                offset: (region.x.max(0), region.y.max(0)),
            }
        }
        None => {
            warn!(
                "empty region after crop: bbox={:?}, frame={}x{}",
                region, frame.width, frame.height
            );
            RegionPreprocessed {
                tensor: Array4::zeros((1, 3, target as usize, target as usize)),
                letterbox: Letterbox {
                    scale: 1.0,
                    new_width: target,
                    new_height: target,
                    pad_top: 0,
                    pad_left: 0,
                },
                offset: (region.x.max(0), region.y.max(0)),
            }
        }
    }
}

/// Letterbox-resize a BGR24 buffer into a normalized CHW tensor
fn letterbox_tensor(data: &[u8], width: u32, height: u32, target: u32) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::compute(width, height, target);

    // The buffer is BGR but resize is channel-agnostic; channels are
    // reordered when writing into the tensor below.
    let bgr = RgbImage::from_raw(width, height, data.to_vec())
        .unwrap_or_else(|| RgbImage::new(width, height));
    let resized = imageops::resize(
        &bgr,
        letterbox.new_width.max(1),
        letterbox.new_height.max(1),
        imageops::FilterType::Triangle,
    );

    let fill = f32::from(LETTERBOX_FILL) / 255.0;
    let mut tensor = Array4::from_elem((1, 3, target as usize, target as usize), fill);
    for y in 0..resized.height().min(target) {
        for x in 0..resized.width().min(target) {
            let px = resized.get_pixel(x, y);
            let ty = (y + letterbox.pad_top) as usize;
            let tx = (x + letterbox.pad_left) as usize;
            // BGR bytes -> RGB channel planes
            tensor[[0, 0, ty, tx]] = f32::from(px[2]) / 255.0;
            tensor[[0, 1, ty, tx]] = f32::from(px[1]) / 255.0;
            tensor[[0, 2, ty, tx]] = f32::from(px[0]) / 255.0;
        }
    }
    (tensor, letterbox)
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
    fn test_tensor_shape_and_padding() {
        let frame = solid_frame(64, 48, [0, 0, 0]);
        let pre = preprocess_frame(&frame, 64);
        assert_eq!(pre.tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(pre.letterbox.pad_top, 8);
        assert_eq!(pre.letterbox.pad_left, 0);

        // Padding rows keep the letterbox fill value
        let fill = f32::from(LETTERBOX_FILL) / 255.0;
        assert!((pre.tensor[[0, 0, 0, 0]] - fill).abs() < 1e-6);
        assert!((pre.tensor[[0, 1, 63, 63]] - fill).abs() < 1e-6);
        // Content rows carry the (black) frame
        assert!(pre.tensor[[0, 0, 32, 32]].abs() < 1e-6);
    }

    #[test]
    fn test_bgr_to_rgb_reorder() {
        // Pure blue in BGR must land on the blue (third) channel plane
        let frame = solid_frame(32, 32, [255, 0, 0]);
        let pre = preprocess_frame(&frame, 32);
        assert!((pre.tensor[[0, 2, 16, 16]] - 1.0).abs() < 1e-6, "blue plane");
        assert!(pre.tensor[[0, 0, 16, 16]].abs() < 1e-6, "red plane");
    }

    #[test]
    fn test_values_normalized() {
        let frame = solid_frame(32, 32, [255, 255, 255]);
        let pre = preprocess_frame(&frame, 32);
        for v in pre.tensor.iter() {
            assert!((0.0..=1.0).contains(v));
        }
    }

    #[test]
    fn test_region_offset_carried() {
        let frame = solid_frame(64, 64, [10, 20, 30]);
        let pre = preprocess_region(&frame, BoundingBox::new(16, 8, 32, 32), 32);
        assert_eq!(pre.offset, (16, 8));
        assert_eq!(pre.tensor.shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_empty_region_zero_tensor() {
        let frame = solid_frame(64, 64, [10, 20, 30]);
        let pre = preprocess_region(&frame, BoundingBox::new(100, 100, 10, 10), 32);
        assert!((pre.letterbox.scale - 1.0).abs() < 1e-6);
        assert!(pre.tensor.iter().all(|v| *v == 0.0));

        // Offsets stay non-negative even for an empty off-frame region
        let pre = preprocess_region(&frame, BoundingBox::new(-50, -50, 10, 10), 32);
        assert_eq!(pre.offset, (0, 0));
        assert!(pre.tensor.iter().all(|v| *v == 0.0));
    }
}
