//! Geometry utilities: batch IoU and the letterbox transform

use crate::BoundingBox;
use ndarray::Array2;

/// Constant fill value for letterbox padding (YOLO convention)
pub const LETTERBOX_FILL: u8 = 114;

/// Compute the IoU matrix between two box lists.
///
/// Element `(i, j)` is `IoU(a[i], b[j])`. Agrees with
/// [`BoundingBox::iou`] for every pair.
#[must_use]
pub fn iou_matrix(a: &[BoundingBox], b: &[BoundingBox]) -> Array2<f32> {
    let mut out = Array2::zeros((a.len(), b.len()));
    if a.is_empty() || b.is_empty() {
        return out;
    }

    let areas_b: Vec<i64> = b.iter().map(BoundingBox::area).collect();
    for (i, box_a) in a.iter().enumerate() {
        let area_a = box_a.area();
        for (j, box_b) in b.iter().enumerate() {
            let x1 = box_a.x.max(box_b.x);
            let y1 = box_a.y.max(box_b.y);
            let x2 = box_a.right().min(box_b.right());
            let y2 = box_a.bottom().min(box_b.bottom());
            let intersection = i64::from((x2 - x1).max(0)) * i64::from((y2 - y1).max(0));
            let union = area_a + areas_b[j] - intersection;
            if union > 0 {
                out[[i, j]] = intersection as f32 / union as f32;
            }
        }
    }
    out
}

/// Aspect-preserving resize-into-square parameters.
///
/// `scale` is applied first, then the scaled content is centered in the
/// `target` square with symmetric padding filled with [`LETTERBOX_FILL`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub new_width: u32,
    pub new_height: u32,
    pub pad_top: u32,
    pub pad_left: u32,
}

impl Letterbox {
    /// Compute the transform for a `source_width` x `source_height` image
    /// into a `target` x `target` square
    #[must_use]
    pub fn compute(source_width: u32, source_height: u32, target: u32) -> Self {
        let scale = (target as f32 / source_height as f32).min(target as f32 / source_width as f32);
        let new_height = (source_height as f32 * scale) as u32;
        let new_width = (source_width as f32 * scale) as u32;
        Self {
            scale,
            new_width,
            new_height,
            pad_top: (target - new_height) / 2,
            pad_left: (target - new_width) / 2,
        }
    }

    /// Map a source-space point into letterboxed model space
    #[must_use]
    pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_left as f32,
            y * self.scale + self.pad_top as f32,
        )
    }

    /// Map a model-space point back into source space
    #[must_use]
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_left as f32) / self.scale,
            (y - self.pad_top as f32) / self.scale,
        )
    }
}
