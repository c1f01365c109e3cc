//! SORT-style multi-object tracker
//!
//! Associates per-frame detections with persistent tracks using IoU matching
//! over Kalman-predicted boxes. Tracks move through a
//! Tentative → Active → Stationary / Lost lifecycle and are evicted under a
//! bounded-memory policy.
//!
//! # Example
//! ```no_run
//! use streamlens_tracking::{ObjectTracker, TrackerConfig};
//!
//! let mut tracker = ObjectTracker::new(TrackerConfig::default());
//! // For each frame, pass the filtered detections
//! // let tracks = tracker.update(&detections, frame_number);
//! ```

pub mod assignment;
pub mod kalman;

pub use kalman::KalmanFilter;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use streamlens_common::{geometry, BoundingBox, Detection};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounded ring capacity for per-track bounding-box history
const BBOX_HISTORY_CAPACITY: usize = 50;
/// How many frames back the stationary check compares against
const STATIONARY_LOOKBACK: usize = 10;
/// Center movement below this many pixels over the lookback counts as stationary
const STATIONARY_MOVEMENT_PX: f32 = 5.0;
/// Rolling window length for the ID-switching monitor (60 s at 5 fps)
const SWITCHING_WINDOW: usize = 300;
/// How often the switching monitor evaluates, in frames
const SWITCHING_CHECK_INTERVAL: u64 = 50;
/// Switching rate above which the monitor warns
const SWITCHING_RATE_THRESHOLD: f32 = 0.05;

/// Lifecycle state of a tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Seen, but not yet matched often enough to confirm
    Tentative,
    /// Confirmed and moving
    Active,
    /// Confirmed and holding still
    Stationary,
    /// Missed at least one frame; kept alive on prediction only
    Lost,
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Frames without a match before a track is deleted (6 s at 5 fps)
    pub max_age: u32,
    /// Matches needed to confirm a tentative track
    pub min_hits: u32,
    /// Minimum IoU for a detection-to-track match
    pub iou_threshold: f32,
    /// Hard cap on concurrently tracked objects per stream
    pub max_tracks: usize,
    /// Consecutive stationary frames before Active becomes Stationary
    pub stationary_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 30,
            min_hits: 3,
            iou_threshold: 0.3,
            max_tracks: 15,
            stationary_frames: 10,
        }
    }
}

/// One tracked object with its full lifecycle bookkeeping
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: Uuid,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Estimated velocity in pixels per frame
    pub velocity: (f32, f32),
    pub state: TrackState,
    /// Number of matched detections over the track's lifetime
    pub hits: u32,
    /// Frames since creation
    pub age: u32,
    pub last_seen_frame: u64,
    pub frames_since_detection: u32,
    pub frames_stationary: u32,
    /// Bounded ring of recent boxes, newest last
    pub bbox_history: VecDeque<BoundingBox>,
}

impl TrackedObject {
    fn new(detection: &Detection, frame_number: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox,
            velocity: (0.0, 0.0),
            state: TrackState::Tentative,
            hits: 1,
            age: 1,
            last_seen_frame: frame_number,
            frames_since_detection: 0,
            frames_stationary: 0,
            bbox_history: VecDeque::with_capacity(BBOX_HISTORY_CAPACITY),
        }
    }

    fn push_history(&mut self, bbox: BoundingBox) {
        if self.bbox_history.len() == BBOX_HISTORY_CAPACITY {
            self.bbox_history.pop_front();
        }
        self.bbox_history.push_back(bbox);
    }

    /// Re-derive the lifecycle state from the current counters
    fn update_state(&mut self, config: &TrackerConfig) {
        if self.frames_since_detection > 0 {
            self.state = TrackState::Lost;
            return;
        }
        self.state = match self.state {
            TrackState::Tentative if self.hits < config.min_hits => TrackState::Tentative,
            _ if self.frames_stationary >= config.stationary_frames => TrackState::Stationary,
            _ => TrackState::Active,
        };
    }
}

/// Serializable per-frame view of a track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: Uuid,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub velocity: (f32, f32),
    pub state: TrackState,
}

/// Multi-object tracker owning all per-stream track state.
///
/// Each track owns exactly one Kalman filter for its lifetime; both are
/// created and destroyed together.
pub struct ObjectTracker {
    config: TrackerConfig,
    tracks: Vec<TrackedObject>,
    filters: HashMap<Uuid, KalmanFilter>,
    switching_window: VecDeque<u32>,
    last_switching_check: u64,
    frame_count: u64,
}

impl ObjectTracker {
    /// Create a new tracker
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        info!(
            "ObjectTracker initialized: max_age={}, min_hits={}, iou_threshold={}, max_tracks={}",
            config.max_age, config.min_hits, config.iou_threshold, config.max_tracks
        );
        Self {
            config,
            tracks: Vec::with_capacity(16),
            filters: HashMap::new(),
            switching_window: VecDeque::with_capacity(SWITCHING_WINDOW),
            last_switching_check: 0,
            frame_count: 0,
        }
    }

    /// Update the tracker with the detections of one frame.
    ///
    /// Returns all non-deleted tracks after the update.
    pub fn update(&mut self, detections: &[Detection], frame_number: u64) -> &[TrackedObject] {
        self.frame_count = frame_number;
        debug!(
            "tracker update: frame={}, detections={}, tracks={}",
            frame_number,
            detections.len(),
            self.tracks.len()
        );

        // Step 1: advance every track to its predicted position
        let mut predicted = Vec::with_capacity(self.tracks.len());
        for track in &mut self.tracks {
            if let Some(filter) = self.filters.get_mut(&track.id) {
                filter.predict();
                track.bbox = filter.bbox();
                track.velocity = filter.velocity();
            }
            predicted.push(track.bbox);
        }

        // Step 2+3: IoU cost matrix and assignment, thresholded by IoU
        let detection_boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
        let mut matched: Vec<(usize, usize)> = Vec::new();
        if !detection_boxes.is_empty() && !predicted.is_empty() {
            let iou = geometry::iou_matrix(&detection_boxes, &predicted);
            let cost = iou.mapv(|v| 1.0 - v);
            let (det_indices, track_indices) = assignment::solve(&cost);
            for (&det_idx, &track_idx) in det_indices.iter().zip(track_indices.iter()) {
                if iou[[det_idx, track_idx]] >= self.config.iou_threshold {
                    matched.push((det_idx, track_idx));
                }
            }
        }
        debug!("matching: {} of {} detections matched", matched.len(), detections.len());

        let mut matched_dets = vec![false; detections.len()];
        let mut matched_tracks = vec![false; self.tracks.len()];

        // Step 4: correct matched tracks with their detections
        for &(det_idx, track_idx) in &matched {
            matched_dets[det_idx] = true;
            matched_tracks[track_idx] = true;

            let detection = &detections[det_idx];
            let track = &mut self.tracks[track_idx];
            if let Some(filter) = self.filters.get_mut(&track.id) {
                filter.update(&detection.bbox);
                track.bbox = filter.bbox();
                track.velocity = filter.velocity();
            } else {
                track.bbox = detection.bbox;
                track.velocity = (0.0, 0.0);
            }

            track.confidence = detection.confidence;
            track.last_seen_frame = frame_number;
            track.frames_since_detection = 0;
            track.hits += 1;
            track.age += 1;
            track.push_history(track.bbox);

            // Stationary check: movement of the center over the lookback span
            if track.bbox_history.len() >= STATIONARY_LOOKBACK {
                let old = track.bbox_history[track.bbox_history.len() - STATIONARY_LOOKBACK];
                if track.bbox.center_distance(&old) < STATIONARY_MOVEMENT_PX {
                    track.frames_stationary += 1;
                } else {
                    track.frames_stationary = 0;
                }
            }

            track.update_state(&self.config);
        }

        // Step 5: age unmatched tracks on prediction only. This runs before
        // track creation so the indices still line up and a track missed
        // this frame is already Lost when the eviction policy looks for one.
        for (track_idx, track) in self.tracks.iter_mut().enumerate() {
            if matched_tracks[track_idx] {
                continue;
            }
            track.frames_since_detection += 1;
            track.age += 1;
            track.update_state(&self.config);
        }

        // Step 6: new tracks from unmatched detections
        let mut created = 0u32;
        for (det_idx, detection) in detections.iter().enumerate() {
            if matched_dets[det_idx] {
                continue;
            }
            if self.tracks.len() >= self.config.max_tracks && !self.evict_oldest_lost() {
                warn!(
                    "track pool full ({} tracks) with no lost track to evict, dropping {} candidate",
                    self.config.max_tracks, detection.class_name
                );
                continue;
            }

            let track = TrackedObject::new(detection, frame_number);
            info!(
                "new track: id={}, class={}, bbox={:?}",
                track.id, track.class_name, track.bbox
            );
            self.filters
                .insert(track.id, KalmanFilter::new(&detection.bbox));
            self.tracks.push(track);
            created += 1;
        }

        // Step 7: delete expired tracks and release their filters
        let max_age = self.config.max_age;
        let mut deleted = 0u32;
        let filters = &mut self.filters;
        self.tracks.retain(|track| {
            if track.frames_since_detection > max_age {
                info!(
                    "track deleted: id={}, age={}, no detection for {} frames",
                    track.id, track.age, track.frames_since_detection
                );
                filters.remove(&track.id);
                deleted += 1;
                false
            } else {
                true
            }
        });

        self.record_switching(created + deleted, frame_number);

        debug!("tracker state: {} tracks after update", self.tracks.len());
        &self.tracks
    }

    /// Evict the oldest Lost track to make room; returns false when none exists
    fn evict_oldest_lost(&mut self) -> bool {
        let candidate = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.state == TrackState::Lost)
            .max_by_key(|(_, t)| t.age)
            .map(|(i, _)| i);

        match candidate {
            Some(idx) => {
                let track = self.tracks.remove(idx);
                warn!(
                    "track pool full ({} tracks), evicting oldest lost track id={} age={}",
                    self.config.max_tracks, track.id, track.age
                );
                self.filters.remove(&track.id);
                true
            }
            None => false,
        }
    }

    fn record_switching(&mut self, events: u32, frame_number: u64) {
        if self.switching_window.len() == SWITCHING_WINDOW {
            self.switching_window.pop_front();
        }
        self.switching_window.push_back(events);

        if frame_number - self.last_switching_check >= SWITCHING_CHECK_INTERVAL {
            self.last_switching_check = frame_number;
            let total: u32 = self.switching_window.iter().sum();
            let window = self.switching_window.len().max(1);
            let avg_tracks = self.tracks.len().max(1);
            let rate = total as f32 / (window * avg_tracks) as f32;
            if rate > SWITCHING_RATE_THRESHOLD {
                warn!(
                    "high track ID switching rate: {:.1}% over {} frames ({} switches), \
                     tracking may be unstable",
                    rate * 100.0,
                    window,
                    total
                );
            }
        }
    }

    /// All non-deleted tracks
    #[must_use]
    pub fn tracks(&self) -> &[TrackedObject] {
        &self.tracks
    }

    /// Tracks that are not stationary (candidates for full-rate detection)
    pub fn active_objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracks
            .iter()
            .filter(|t| t.state != TrackState::Stationary)
    }

    /// Stationary tracks (re-detected at a reduced cadence)
    pub fn stationary_objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracks
            .iter()
            .filter(|t| t.state == TrackState::Stationary)
    }

    /// Serializable view of every non-deleted track
    #[must_use]
    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.tracks
            .iter()
            .map(|t| TrackSnapshot {
                id: t.id,
                class_name: t.class_name.clone(),
                confidence: t.confidence,
                bbox: t.bbox,
                velocity: t.velocity,
                state: t.state,
            })
            .collect()
    }

    /// Clear all tracks and their Kalman filters
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.filters.clear();
        self.switching_window.clear();
        self.frame_count = 0;
        self.last_switching_check = 0;
        info!("ObjectTracker reset: all tracks cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_name: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            class_id: 0,
            class_name: class_name.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn test_track_creation_is_tentative() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        let tracks = tracker.update(&[detection("person", 0.9, BoundingBox::new(100, 100, 50, 80))], 1);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].state, TrackState::Tentative);
        assert_eq!(tracks[0].hits, 1);
        assert_eq!(tracks[0].age, 1);
    }

    #[test]
    fn test_hits_never_exceed_age() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        let bbox = BoundingBox::new(100, 100, 50, 80);
        for frame in 1..=15 {
            let dets = if frame % 3 == 0 {
                vec![]
            } else {
                vec![detection("person", 0.9, bbox)]
            };
            for track in tracker.update(&dets, frame) {
                assert!(track.hits <= track.age, "hits {} > age {}", track.hits, track.age);
            }
        }
    }

    #[test]
    fn test_tentative_to_active_at_min_hits() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        let bbox = BoundingBox::new(100, 100, 50, 80);
        tracker.update(&[detection("person", 0.9, bbox)], 1);
        tracker.update(&[detection("person", 0.9, bbox)], 2);
        let tracks = tracker.update(&[detection("person", 0.9, bbox)], 3);
        assert_eq!(tracks[0].state, TrackState::Active);
    }

    #[test]
    fn test_lost_on_miss_and_reactivated_on_match() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        let bbox = BoundingBox::new(100, 100, 50, 80);
        for frame in 1..=3 {
            tracker.update(&[detection("person", 0.9, bbox)], frame);
        }
        let tracks = tracker.update(&[], 4);
        assert_eq!(tracks[0].state, TrackState::Lost);

        let tracks = tracker.update(&[detection("person", 0.9, bbox)], 5);
        assert_eq!(tracks[0].state, TrackState::Active);
        assert_eq!(tracks[0].frames_since_detection, 0);
    }

    #[test]
    fn test_max_tracks_enforced() {
        let config = TrackerConfig {
            max_tracks: 3,
            ..Default::default()
        };
        let mut tracker = ObjectTracker::new(config);
        // Six well-separated detections in one frame
        let dets: Vec<Detection> = (0..6)
            .map(|i| detection("person", 0.9, BoundingBox::new(i * 200, 0, 50, 50)))
            .collect();
        let tracks = tracker.update(&dets, 1);
        assert_eq!(tracks.len(), 3);
    }

    #[test]
    fn test_eviction_prefers_oldest_lost() {
        let config = TrackerConfig {
            max_tracks: 2,
            min_hits: 1,
            ..Default::default()
        };
        let mut tracker = ObjectTracker::new(config);
        tracker.update(
            &[
                detection("person", 0.9, BoundingBox::new(0, 0, 50, 50)),
                detection("car", 0.9, BoundingBox::new(500, 0, 80, 50)),
            ],
            1,
        );
        // Both go lost
        tracker.update(&[], 2);
        let lost_ids: Vec<Uuid> = tracker.tracks().iter().map(|t| t.id).collect();

        // A new detection must evict one lost track, not be dropped
        let tracks = tracker.update(&[detection("dog", 0.9, BoundingBox::new(1000, 0, 40, 40))], 3);
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().any(|t| t.class_name == "dog"));
        let survivors: Vec<Uuid> = tracks.iter().map(|t| t.id).collect();
        assert_eq!(lost_ids.iter().filter(|&id| survivors.contains(id)).count(), 1);
    }

    #[test]
    fn test_track_ids_unique_across_lifecycle() {
        let config = TrackerConfig {
            max_age: 1,
            ..Default::default()
        };
        let mut tracker = ObjectTracker::new(config);
        let bbox = BoundingBox::new(100, 100, 50, 50);
        let mut seen = Vec::new();

        for round in 0..3 {
            let base = round * 10;
            tracker.update(&[detection("person", 0.9, bbox)], base + 1);
            seen.extend(tracker.tracks().iter().map(|t| t.id));
            // Miss enough frames to delete the track
            for offset in 2..=4 {
                tracker.update(&[], base + offset);
            }
            assert!(tracker.tracks().is_empty());
        }

        seen.sort();
        let len = seen.len();
        seen.dedup();
        assert_eq!(seen.len(), len, "track ids were reused");
    }

    #[test]
    fn test_one_filter_per_track() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        let dets: Vec<Detection> = (0..4)
            .map(|i| detection("person", 0.9, BoundingBox::new(i * 200, 0, 50, 50)))
            .collect();
        tracker.update(&dets, 1);
        assert_eq!(tracker.filters.len(), tracker.tracks.len());

        // Delete everything via max_age expiry
        for frame in 2..40 {
            tracker.update(&[], frame);
        }
        assert!(tracker.tracks.is_empty());
        assert!(tracker.filters.is_empty(), "kalman filters leaked");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        tracker.update(&[detection("person", 0.9, BoundingBox::new(0, 0, 50, 50))], 1);
        tracker.reset();
        assert!(tracker.tracks().is_empty());
        assert!(tracker.filters.is_empty());
    }
}
