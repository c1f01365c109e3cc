//! YOLO11 output decoding
//!
//! The model emits `(1, 4+C, N)` where the first four features of each
//! anchor are `[cx, cy, w, h]` in letterboxed model coordinates and the
//! remaining `C` are per-class probabilities (no separate objectness term).

use ndarray::{Array3, Axis};
use streamlens_common::{get_coco_class_name, BoundingBox, Detection, Letterbox};
use tracing::debug;

/// Confidence below which anchors are discarded before coordinate work
const PRE_FILTER_CONFIDENCE: f32 = 0.01;

/// Decode raw model output into detections in source coordinates.
///
/// `width` and `height` are the dimensions of the image that was
/// letterboxed (the full frame, or the cropped region in region mode).
/// Boxes whose corners land outside the source image before clipping are
/// dropped; region-mode remapping would otherwise turn them into
/// degenerate full-frame boxes.
#[must_use]
pub fn decode(output: &Array3<f32>, letterbox: &Letterbox, width: u32, height: u32) -> Vec<Detection> {
    let view = output.index_axis(Axis(0), 0);
    let (num_features, num_anchors) = (view.nrows(), view.ncols());
    if num_features < 5 {
        debug!("output has {} features, nothing to decode", num_features);
        return Vec::new();
    }
    let num_classes = num_features - 4;
    let (w_max, h_max) = (width as i32, height as i32);

    let mut detections = Vec::with_capacity(num_anchors / 10);
    for anchor in 0..num_anchors {
        // Class with the highest probability
        let mut class_id = 0usize;
        let mut confidence = 0.0f32;
        for class in 0..num_classes {
            let p = view[[4 + class, anchor]];
            if p > confidence {
                confidence = p;
                class_id = class;
            }
        }
        if confidence < PRE_FILTER_CONFIDENCE {
            continue;
        }

        let cx = view[[0, anchor]];
        let cy = view[[1, anchor]];
        let w = view[[2, anchor]];
        let h = view[[3, anchor]];

        // Center form -> corners, inverting the letterbox
        let (x1f, y1f) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2f, y2f) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);
        let (x1, y1, x2, y2) = (x1f as i32, y1f as i32, x2f as i32, y2f as i32);

        // Drop boxes leaving the source image before clipping; a corner
        // exactly on the frame boundary is still inside.
        if x1 < 0 || y1 < 0 || x2 > w_max || y2 > h_max {
            continue;
        }

        let x1 = x1.clamp(0, w_max);
        let y1 = y1.clamp(0, h_max);
        let x2 = x2.clamp(0, w_max);
        let y2 = y2.clamp(0, h_max);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            class_id: class_id as u8,
            class_name: get_coco_class_name(class_id as u8).to_string(),
            confidence,
            bbox: BoundingBox::from_corners(x1, y1, x2, y2),
        });
    }

    debug!("decoded {} detections from {} anchors", detections.len(), num_anchors);
    detections
}
