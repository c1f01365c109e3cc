//! Motion detection by background subtraction
//!
//! Turns decoded frames into motion regions: a Gaussian-mixture background
//! model produces a foreground mask, morphology cleans it up, surviving
//! contours are filtered, merged by proximity, de-duplicated with NMS, and
//! padded before being handed to the detection pipeline.
//!
//! # Example
//! ```no_run
//! use streamlens_motion::{MotionDetector, MotionDetectorConfig};
//! # let frame: streamlens_common::Frame = unimplemented!();
//!
//! let mut detector = MotionDetector::new(MotionDetectorConfig::default());
//! let regions = detector.extract(&frame);
//! for region in regions {
//!     println!("motion at {:?} ({} px)", region.bbox, region.area);
//! }
//! ```

pub mod subtractor;

pub use subtractor::BackgroundSubtractor;

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, open};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use streamlens_common::{BoundingBox, Frame};
use tracing::{debug, info, warn};

/// Contours covering more than this fraction of the frame are treated as
/// lighting changes, not motion
const MAX_REGION_FRACTION: f64 = 0.8;
/// Padding applied to each kept region, as a fraction of its larger side
const REGION_PADDING_FRACTION: f32 = 0.15;
/// Morphology kernel radius (LInf radius 2 = 5x5 square)
const MORPH_KERNEL_RADIUS: u8 = 2;
/// Rolling window length for the false-positive monitor (60 s at 5 fps)
const MOTION_WINDOW: usize = 300;
/// How often the false-positive monitor evaluates, in frames
const MOTION_CHECK_INTERVAL: u64 = 50;
/// Fraction of motion frames above which the monitor warns
const MOTION_RATE_THRESHOLD: f32 = 0.5;

/// Motion detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionDetectorConfig {
    /// Frames of history behind the background model
    pub history: u32,
    /// Squared-Mahalanobis gate for background matching
    pub var_threshold: f32,
    /// Mark shadow pixels distinctly in the mask
    pub detect_shadows: bool,
    /// Background adaptation rate
    pub learning_rate: f32,
    /// Minimum contour area in pixels
    pub min_contour_area: f64,
    /// Center distance below which regions merge, in pixels
    pub merge_distance: f32,
    /// IoU threshold for region NMS
    pub nms_iou_threshold: f32,
}

impl Default for MotionDetectorConfig {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
            detect_shadows: true,
            learning_rate: 0.005,
            min_contour_area: 500.0,
            merge_distance: 40.0,
            nms_iou_threshold: 0.4,
        }
    }
}

/// A region of detected motion within one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionRegion {
    /// Padded bounding box, clipped to the frame
    pub bbox: BoundingBox,
    /// Summed pixel area of the source contours
    pub area: u64,
    /// Frame timestamp in seconds
    pub timestamp: f64,
    /// How many contours were merged into this region
    pub merged_count: u32,
}

/// Motion detector for one stream
pub struct MotionDetector {
    config: MotionDetectorConfig,
    subtractor: Option<BackgroundSubtractor>,
    frame_count: u64,
    motion_window: VecDeque<bool>,
    last_motion_check: u64,
}

impl MotionDetector {
    /// Create a new motion detector
    #[must_use]
    pub fn new(config: MotionDetectorConfig) -> Self {
        info!(
            "MotionDetector initialized: history={}, var_threshold={}, detect_shadows={}, learning_rate={}",
            config.history, config.var_threshold, config.detect_shadows, config.learning_rate
        );
        Self {
            config,
            subtractor: None,
            frame_count: 0,
            motion_window: VecDeque::with_capacity(MOTION_WINDOW),
            last_motion_check: 0,
        }
    }

    /// Extract motion regions from one frame
    pub fn extract(&mut self, frame: &Frame) -> Vec<MotionRegion> {
        let gray = frame.to_gray();
        let mask = self.subtract(&gray);

        // Morphological opening removes speckle; a dilation pass closes
        // small gaps before contour extraction.
        let mask = open(&mask, Norm::LInf, MORPH_KERNEL_RADIUS);
        let mask = dilate(&mask, Norm::LInf, MORPH_KERNEL_RADIUS);

        let contours: Vec<Contour<i32>> = find_contours(&mask);
        debug!("background subtraction: {} raw contours", contours.len());

        let max_region_area = frame.area() as f64 * MAX_REGION_FRACTION;
        let mut candidates: Vec<(BoundingBox, f64)> = Vec::new();
        for contour in &contours {
            if contour.border_type != BorderType::Outer {
                continue;
            }
            let area = contour_area(contour);
            if area < self.config.min_contour_area {
                continue;
            }
            if area > max_region_area {
                debug!(
                    "skipping full-frame motion region (lighting change): area={:.0} px",
                    area
                );
                continue;
            }
            match contour_bbox(contour) {
                Some(bbox) if bbox.x >= 0 && bbox.y >= 0 && bbox.w > 0 && bbox.h > 0 => {
                    candidates.push((bbox, area));
                }
                other => {
                    warn!("rejecting invalid motion region: {:?}", other);
                }
            }
        }

        let regions = if candidates.is_empty() {
            Vec::new()
        } else {
            debug!(
                "after filtering: {} regions (min_area={})",
                candidates.len(),
                self.config.min_contour_area
            );

            let merged = merge_nearby(candidates, self.config.merge_distance);
            debug!(
                "after merging: {} regions (distance={})",
                merged.len(),
                self.config.merge_distance
            );

            let kept = suppress_by_area(merged, self.config.nms_iou_threshold);
            debug!(
                "after NMS: {} regions (iou_threshold={})",
                kept.len(),
                self.config.nms_iou_threshold
            );

            kept.into_iter()
                .filter_map(|(bbox, area, merged_count)| {
                    let padding = (bbox.w.max(bbox.h) as f32 * REGION_PADDING_FRACTION) as i32;
                    let padded = bbox.expand(padding).clip(frame.width, frame.height)?;
                    Some(MotionRegion {
                        bbox: padded,
                        area: area as u64,
                        timestamp: frame.timestamp,
                        merged_count,
                    })
                })
                .collect()
        };

        self.record_motion(!regions.is_empty());
        debug!("motion detection complete: {} regions", regions.len());
        regions
    }

    fn subtract(&mut self, gray: &GrayImage) -> GrayImage {
        let (w, h) = (gray.width(), gray.height());
        let (history, var_threshold, detect_shadows) = (
            self.config.history,
            self.config.var_threshold,
            self.config.detect_shadows,
        );
        let bg = self
            .subtractor
            .get_or_insert_with(|| BackgroundSubtractor::new(w, h, history, var_threshold, detect_shadows));
        bg.apply(gray, self.config.learning_rate)
    }

    fn record_motion(&mut self, has_motion: bool) {
        self.frame_count += 1;
        if self.motion_window.len() == MOTION_WINDOW {
            self.motion_window.pop_front();
        }
        self.motion_window.push_back(has_motion);

        if self.frame_count - self.last_motion_check >= MOTION_CHECK_INTERVAL {
            self.last_motion_check = self.frame_count;
            let motion_frames = self.motion_window.iter().filter(|&&m| m).count();
            let total = self.motion_window.len().max(1);
            let rate = motion_frames as f32 / total as f32;
            if rate > MOTION_RATE_THRESHOLD {
                warn!(
                    "high motion detection rate: {:.1}% of the last {} frames ({}/{}); \
                     possible background misconfiguration or camera instability",
                    rate * 100.0,
                    total,
                    motion_frames,
                    total
                );
            }
        }
    }

    /// Recreate the background model.
    ///
    /// Frame counters and the false-positive window deliberately survive a
    /// reset: a mid-stream reset should not blank the monitoring history.
    pub fn reset(&mut self) {
        if let Some(bg) = self.subtractor.as_mut() {
            bg.reset();
        }
        info!("MotionDetector reset: background model cleared");
    }
}

/// Polygon area of a contour via the shoelace formula
fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        twice_area += i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y);
    }
    twice_area.unsigned_abs() as f64 / 2.0
}

/// Tight bounding rectangle of a contour's points
fn contour_bbox(contour: &Contour<i32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::from_corners(min_x, min_y, max_x + 1, max_y + 1))
}

/// Merge boxes whose centers fall within `merge_distance`.
///
/// Merging is iterative within a group: after each absorb the group's
/// center moves, and later boxes are tested against the updated center.
/// Returns `(bbox, summed_area, merged_count)` triples.
fn merge_nearby(bboxes: Vec<(BoundingBox, f64)>, merge_distance: f32) -> Vec<(BoundingBox, f64, u32)> {
    let mut merged = Vec::with_capacity(bboxes.len());
    let mut used = vec![false; bboxes.len()];

    for i in 0..bboxes.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let (mut bbox, mut area) = bboxes[i];
        let mut merged_count = 1;

        for j in (i + 1)..bboxes.len() {
            if used[j] {
                continue;
            }
            let (other, other_area) = bboxes[j];
            if bbox.center_distance(&other) <= merge_distance {
                bbox = bbox.union_rect(&other);
                area += other_area;
                merged_count += 1;
                used[j] = true;
            }
        }
        merged.push((bbox, area, merged_count));
    }
    merged
}

/// Area-ordered NMS: keep the largest region, drop overlapping smaller ones
fn suppress_by_area(
    mut regions: Vec<(BoundingBox, f64, u32)>,
    iou_threshold: f32,
) -> Vec<(BoundingBox, f64, u32)> {
    regions.sort_by(|a, b| b.0.area().cmp(&a.0.area()));

    let mut kept: Vec<(BoundingBox, f64, u32)> = Vec::with_capacity(regions.len());
    'outer: for region in regions {
        for existing in &kept {
            if existing.0.iou(&region.0) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(region);
    }
    kept
}
