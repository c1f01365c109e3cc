//! YOLO detection pipeline
//!
//! Preprocessing (full-frame or region-cropped letterbox), ONNX inference,
//! YOLO11 output decoding, class-wise non-maximum suppression, coordinate
//! remapping, and the live per-stream detection filter.
//!
//! # Example
//! ```no_run
//! use streamlens_detection::{Detector, OnnxSession, GpuBackend};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), streamlens_detection::DetectionError> {
//! let session = OnnxSession::open(Path::new("models/yolo11n_640.onnx"), GpuBackend::None)?;
//! let mut detector = Detector::new(Box::new(session), 640);
//! # let frame: streamlens_common::Frame = unimplemented!();
//! let detections = detector.detect_frame(&frame)?;
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod model_cache;
pub mod preprocess;
pub mod session;

pub use model_cache::{delete_cached_model, list_cached_models, model_file_path, CachedModel};
pub use session::{GpuBackend, InferenceBackend, OnnxSession, SharedSession, YoloConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use streamlens_common::{is_coco_class, BoundingBox, Detection, Frame};
use thiserror::Error;
use tracing::{debug, info};

/// Default IoU threshold for class-wise NMS
pub const DEFAULT_NMS_IOU: f32 = 0.5;

/// Detection pipeline errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("failed to build inference session: {0}")]
    SessionBuild(String),

    #[error("GPU backend '{backend}' unavailable: {message}")]
    GpuBackendUnavailable {
        backend: GpuBackend,
        message: String,
    },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output shape: {0}")]
    BadOutputShape(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-stream detection settings, mutable at runtime.
///
/// Changes apply at the next frame boundary; `enabled_labels` is validated
/// against the COCO class table on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDetectionConfig {
    pub enabled: bool,
    pub enabled_labels: Vec<String>,
    pub min_confidence: f32,
}

impl Default for StreamDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enabled_labels: vec!["person".to_string()],
            min_confidence: 0.5,
        }
    }
}

impl StreamDetectionConfig {
    /// Labels in this config that are not COCO classes
    #[must_use]
    pub fn invalid_labels(&self) -> Vec<String> {
        self.enabled_labels
            .iter()
            .filter(|l| !is_coco_class(l))
            .cloned()
            .collect()
    }
}

/// Class-wise non-maximum suppression.
///
/// Within each class, detections are ordered by descending confidence and
/// any lower-confidence box overlapping a kept box above `iou_threshold`
/// is suppressed. Classes never suppress each other, so a person inside a
/// car box survives.
#[must_use]
pub fn apply_nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    let mut by_class: HashMap<&str, Vec<&Detection>> = HashMap::new();
    for det in &detections {
        by_class.entry(det.class_name.as_str()).or_default().push(det);
    }

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    let mut suppressed = 0usize;
    for (_, mut class_dets) in by_class {
        class_dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let mut class_kept: Vec<&Detection> = Vec::with_capacity(class_dets.len());
        'candidates: for det in class_dets {
            for existing in &class_kept {
                if existing.bbox.iou(&det.bbox) > iou_threshold {
                    suppressed += 1;
                    continue 'candidates;
                }
            }
            class_kept.push(det);
        }
        kept.extend(class_kept.into_iter().cloned());
    }

    if suppressed > 0 {
        debug!("NMS suppressed {} overlapping detections", suppressed);
    }
    kept
}

/// Apply the live stream config: label allow-list, confidence floor, NMS
#[must_use]
pub fn filter_detections(
    detections: Vec<Detection>,
    config: &StreamDetectionConfig,
    nms_iou_threshold: f32,
) -> Vec<Detection> {
    let filtered: Vec<Detection> = detections
        .into_iter()
        .filter(|d| {
            d.confidence >= config.min_confidence
                && config.enabled_labels.iter().any(|l| l == &d.class_name)
        })
        .collect();
    apply_nms(filtered, nms_iou_threshold)
}

/// Remap region-local detections into full-frame coordinates.
///
/// Adds the region offset, clips to the frame, and drops anything that
/// maps to zero area.
#[must_use]
pub fn map_to_frame(
    detections: Vec<Detection>,
    offset: (i32, i32),
    frame_width: u32,
    frame_height: u32,
) -> Vec<Detection> {
    let (offset_x, offset_y) = offset;
    detections
        .into_iter()
        .filter_map(|mut det| {
            let moved = BoundingBox::new(
                det.bbox.x + offset_x,
                det.bbox.y + offset_y,
                det.bbox.w,
                det.bbox.h,
            );
            det.bbox = moved.clip(frame_width, frame_height)?;
            Some(det)
        })
        .collect()
}

/// Detection pipeline over one inference backend.
///
/// Decoded detections come back un-suppressed; the caller concatenates
/// results across regions and applies [`filter_detections`] once.
pub struct Detector {
    backend: Box<dyn InferenceBackend>,
    input_size: u32,
}

impl Detector {
    /// Wrap an inference backend with the model's square input size
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>, input_size: u32) -> Self {
        info!("Detector initialized: input_size={}", input_size);
        Self {
            backend,
            input_size,
        }
    }

    /// Run detection over the whole frame
    pub fn detect_frame(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let pre = preprocess::preprocess_frame(frame, self.input_size);
        let output = self.backend.run(pre.tensor.view())?;
        Ok(decode::decode(
            &output,
            &pre.letterbox,
            frame.width,
            frame.height,
        ))
    }

    /// Run detection over one region crop, returning full-frame coordinates
    pub fn detect_region(
        &mut self,
        frame: &Frame,
        region: BoundingBox,
    ) -> Result<Vec<Detection>, DetectionError> {
        let Some(clipped) = region.clip(frame.width, frame.height) else {
            return Ok(Vec::new());
        };
        let pre = preprocess::preprocess_region(frame, region, self.input_size);
        let output = self.backend.run(pre.tensor.view())?;
        let local = decode::decode(&output, &pre.letterbox, clipped.w as u32, clipped.h as u32);
        Ok(map_to_frame(local, pre.offset, frame.width, frame.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_name: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            class_id: streamlens_common::COCO_CLASSES
                .iter()
                .position(|&c| c == class_name)
                .unwrap_or(0) as u8,
            class_name: class_name.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn test_label_filter() {
        let dets = vec![
            detection("person", 0.9, BoundingBox::new(0, 0, 50, 50)),
            detection("car", 0.8, BoundingBox::new(100, 0, 50, 50)),
            detection("dog", 0.85, BoundingBox::new(200, 0, 50, 50)),
        ];
        let config = StreamDetectionConfig {
            enabled: true,
            enabled_labels: vec!["person".to_string(), "car".to_string()],
            min_confidence: 0.5,
        };
        let filtered = filter_detections(dets, &config, DEFAULT_NMS_IOU);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().any(|d| d.class_name == "person" && d.confidence == 0.9));
        assert!(filtered.iter().any(|d| d.class_name == "car" && d.confidence == 0.8));
    }

    #[test]
    fn test_confidence_floor() {
        let dets = vec![
            detection("person", 0.9, BoundingBox::new(0, 0, 50, 50)),
            detection("person", 0.6, BoundingBox::new(100, 0, 50, 50)),
            detection("person", 0.4, BoundingBox::new(200, 0, 50, 50)),
        ];
        let config = StreamDetectionConfig {
            enabled: true,
            enabled_labels: vec!["person".to_string()],
            min_confidence: 0.7,
        };
        let filtered = filter_detections(dets, &config, DEFAULT_NMS_IOU);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_suppresses_within_class() {
        let dets = vec![
            detection("person", 0.9, BoundingBox::new(0, 0, 100, 100)),
            detection("person", 0.7, BoundingBox::new(10, 10, 100, 100)),
        ];
        let kept = apply_nms(dets, 0.5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_preserves_across_classes() {
        // A person fully inside a car box must survive
        let dets = vec![
            detection("car", 0.9, BoundingBox::new(0, 0, 200, 120)),
            detection("person", 0.8, BoundingBox::new(20, 10, 160, 100)),
        ];
        let kept = apply_nms(dets, 0.5);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_idempotent() {
        let dets = vec![
            detection("person", 0.9, BoundingBox::new(0, 0, 100, 100)),
            detection("person", 0.7, BoundingBox::new(10, 10, 100, 100)),
            detection("car", 0.8, BoundingBox::new(300, 300, 80, 80)),
            detection("car", 0.6, BoundingBox::new(310, 310, 80, 80)),
            detection("dog", 0.5, BoundingBox::new(500, 0, 40, 40)),
        ];
        let once = apply_nms(dets, 0.5);
        let mut twice = apply_nms(once.clone(), 0.5);

        let key = |d: &Detection| (d.class_name.clone(), d.bbox.x, d.bbox.y);
        let mut once = once;
        once.sort_by_key(key);
        twice.sort_by_key(key);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.bbox, b.bbox);
            assert_eq!(a.class_name, b.class_name);
        }
    }

    #[test]
    fn test_map_to_frame_offsets_and_clips() {
        let dets = vec![
            detection("person", 0.9, BoundingBox::new(10, 10, 50, 50)),
            detection("car", 0.8, BoundingBox::new(90, 90, 50, 50)),
        ];
        let mapped = map_to_frame(dets, (500, 380), 640, 480);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].bbox, BoundingBox::new(510, 390, 50, 50));
        // Second box clipped at the frame edge
        assert_eq!(mapped[1].bbox, BoundingBox::new(590, 470, 50, 10));
    }

    #[test]
    fn test_map_to_frame_drops_zero_area() {
        let dets = vec![detection("person", 0.9, BoundingBox::new(200, 200, 50, 50))];
        let mapped = map_to_frame(dets, (600, 460), 640, 480);
        assert!(mapped.is_empty());
    }

    #[test]
    fn test_invalid_labels() {
        let config = StreamDetectionConfig {
            enabled: true,
            enabled_labels: vec![
                "person".to_string(),
                "invalid_class".to_string(),
                "dragon".to_string(),
            ],
            min_confidence: 0.5,
        };
        assert_eq!(config.invalid_labels(), vec!["invalid_class", "dragon"]);

        let valid = StreamDetectionConfig::default();
        assert!(valid.invalid_labels().is_empty());
    }
}
