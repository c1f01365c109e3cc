//! Common types shared across the StreamLens analytics pipeline
//!
//! This crate provides the frame buffer, bounding box, geometry utilities,
//! and the COCO class table used by the motion detector, detection pipeline,
//! tracker, and renderer.

pub mod frame;
pub mod geometry;

pub use frame::Frame;
pub use geometry::{iou_matrix, Letterbox, LETTERBOX_FILL};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates `(x, y, width, height)`.
///
/// Coordinates may go negative or exceed frame bounds while a box is being
/// constructed (e.g. after Kalman prediction); every box that leaves a
/// pipeline stage is clipped with [`BoundingBox::clip`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Create a box from corner coordinates `(x1, y1, x2, y2)`
    #[must_use]
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        }
    }

    /// Get center coordinates
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.w as f32 / 2.0,
            self.y as f32 + self.h as f32 / 2.0,
        )
    }

    /// Get area in pixels
    #[must_use]
    #[inline]
    pub fn area(&self) -> i64 {
        i64::from(self.w) * i64::from(self.h)
    }

    /// Right edge (exclusive)
    #[must_use]
    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    /// Bottom edge (exclusive)
    #[must_use]
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Calculate Intersection over Union with another box.
    ///
    /// Returns `0.0` when the union is empty.
    #[must_use]
    #[inline]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let inter_w = i64::from((x2 - x1).max(0));
        let inter_h = i64::from((y2 - y1).max(0));
        let intersection = inter_w * inter_h;

        let union = self.area() + other.area() - intersection;
        if union > 0 {
            intersection as f32 / union as f32
        } else {
            0.0
        }
    }

    /// Euclidean distance between this box's center and another's
    #[must_use]
    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (cx1, cy1) = self.center();
        let (cx2, cy2) = other.center();
        ((cx1 - cx2).powi(2) + (cy1 - cy2).powi(2)).sqrt()
    }

    /// Union bounding rectangle of two boxes
    #[must_use]
    pub fn union_rect(&self, other: &BoundingBox) -> BoundingBox {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        BoundingBox::from_corners(x1, y1, x2, y2)
    }

    /// Grow the box by `padding` pixels on each side
    #[must_use]
    pub fn expand(&self, padding: i32) -> BoundingBox {
        BoundingBox {
            x: self.x - padding,
            y: self.y - padding,
            w: self.w + 2 * padding,
            h: self.h + 2 * padding,
        }
    }

    /// Clip the box to `frame_width` x `frame_height`.
    ///
    /// Returns `None` when nothing with positive width and height remains.
    #[must_use]
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x1 = self.x.clamp(0, frame_width as i32);
        let y1 = self.y.clamp(0, frame_height as i32);
        let x2 = self.right().clamp(0, frame_width as i32);
        let y2 = self.bottom().clamp(0, frame_height as i32);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::from_corners(x1, y1, x2, y2))
    }

    /// Whether the box lies fully inside frame bounds with positive extent
    #[must_use]
    pub fn is_valid(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.w > 0
            && self.h > 0
            && self.right() <= frame_width as i32
            && self.bottom() <= frame_height as i32
    }
}

/// Single object detection produced by the detection pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// COCO class ID (0-79)
    pub class_id: u8,
    /// Human-readable class name
    pub class_name: String,
    /// Confidence score (0-1)
    pub confidence: f32,
    /// Bounding box in full-frame pixel coordinates
    pub bbox: BoundingBox,
}

/// Get COCO class name from class ID (0-79)
#[must_use]
pub fn get_coco_class_name(class_id: u8) -> &'static str {
    COCO_CLASSES.get(class_id as usize).unwrap_or(&"unknown")
}

/// Whether `label` is one of the 80 COCO class names
#[must_use]
pub fn is_coco_class(label: &str) -> bool {
    COCO_CLASSES.contains(&label)
}

/// 80 COCO object classes (position = class ID)
pub const COCO_CLASSES: &[&str] = &[
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
