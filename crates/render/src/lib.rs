//! Overlay rendering for motion regions, detections, and tracks
//!
//! Draws directly into the frame's BGR24 buffer through an image view, so
//! no per-frame pixel copies are made. Track colour is a pure function of
//! the lifecycle state.

use image::{ImageBuffer, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use streamlens_common::{BoundingBox, Detection, Frame};
use streamlens_motion::MotionRegion;
use streamlens_tracking::{TrackSnapshot, TrackState};
use tracing::debug;

/// Colours are `[B, G, R]` to match the frame's channel order.
type Bgr = Rgb<u8>;

const MOTION_COLOR: Bgr = Rgb([0, 0, 255]); // red, thin outline
const TRACK_BOX_THICKNESS: i32 = 2;

/// Overlay colour for a track state.
///
/// Green for active tracking, yellow for stationary, orange for tentative,
/// gray for lost.
#[must_use]
pub fn state_color(state: TrackState) -> [u8; 3] {
    match state {
        TrackState::Active => [0, 255, 0],
        TrackState::Stationary => [0, 255, 255],
        TrackState::Tentative => [0, 165, 255],
        TrackState::Lost => [128, 128, 128],
    }
}

/// Deterministic per-class colour for detection overlays
#[must_use]
pub fn class_color(class_id: u8) -> [u8; 3] {
    // Small multiplicative hash; stable across runs and distinct enough
    // for neighbouring class ids.
    let h = u32::from(class_id).wrapping_mul(2654435761);
    [
        (h >> 16) as u8 | 0x40,
        (h >> 8) as u8 | 0x40,
        h as u8 | 0x40,
    ]
}

/// Draw thin motion-region outlines
pub fn draw_motion_regions(frame: &mut Frame, regions: &[MotionRegion]) {
    debug!("rendering {} motion regions", regions.len());
    with_canvas(frame, |canvas, w, h| {
        for region in regions {
            draw_box(canvas, region.bbox, w, h, MOTION_COLOR, 1);
        }
    });
}

/// Draw detection boxes in per-class colours
pub fn draw_detections(frame: &mut Frame, detections: &[Detection]) {
    debug!("rendering {} detections", detections.len());
    with_canvas(frame, |canvas, w, h| {
        for det in detections {
            let color = Rgb(class_color(det.class_id));
            draw_box(canvas, det.bbox, w, h, color, TRACK_BOX_THICKNESS);
        }
    });
}

/// Draw tracked-object boxes coloured by lifecycle state
pub fn draw_tracks(frame: &mut Frame, tracks: &[TrackSnapshot]) {
    debug!("rendering {} tracks", tracks.len());
    with_canvas(frame, |canvas, w, h| {
        for track in tracks {
            let color = Rgb(state_color(track.state));
            draw_box(canvas, track.bbox, w, h, color, TRACK_BOX_THICKNESS);
        }
    });
}

type Canvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

fn with_canvas(frame: &mut Frame, f: impl FnOnce(&mut Canvas<'_>, u32, u32)) {
    let (w, h) = (frame.width, frame.height);
    if let Some(mut canvas) = ImageBuffer::from_raw(w, h, frame.data.as_mut_slice()) {
        f(&mut canvas, w, h);
    }
}

fn draw_box(canvas: &mut Canvas<'_>, bbox: BoundingBox, w: u32, h: u32, color: Bgr, thickness: i32) {
    let Some(clipped) = bbox.clip(w, h) else {
        return;
    };
    for inset in 0..thickness {
        let x = clipped.x + inset;
        let y = clipped.y + inset;
        let bw = clipped.w - 2 * inset;
        let bh = clipped.h - 2 * inset;
        if bw <= 0 || bh <= 0 {
            break;
        }
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(bw as u32, bh as u32), color);
    }
}
