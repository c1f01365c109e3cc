//! Tracker lifecycle scenarios over synthetic detection sequences

use streamlens_common::{BoundingBox, Detection};
use streamlens_tracking::{ObjectTracker, TrackState, TrackerConfig};

fn person_at(bbox: BoundingBox) -> Detection {
    Detection {
        class_id: 0,
        class_name: "person".to_string(),
        confidence: 0.9,
        bbox,
    }
}

/// A single stationary object: Tentative at creation, Active once hits
/// reach min_hits, Stationary once it has held still long enough
#[test]
fn test_stationary_object_lifecycle() {
    let mut tracker = ObjectTracker::new(TrackerConfig::default());
    let bbox = BoundingBox::new(200, 100, 150, 300);

    let mut went_active_at = None;
    let mut went_stationary_at = None;
    for frame in 1..=25 {
        let tracks = tracker.update(&[person_at(bbox)], frame);
        assert_eq!(tracks.len(), 1, "exactly one track expected");
        let track = &tracks[0];

        if frame == 1 {
            assert_eq!(track.state, TrackState::Tentative);
        }
        if track.state == TrackState::Active && went_active_at.is_none() {
            went_active_at = Some(frame);
        }
        if track.state == TrackState::Stationary && went_stationary_at.is_none() {
            went_stationary_at = Some(frame);
        }
    }

    assert_eq!(went_active_at, Some(3), "active once hits reach min_hits");
    let stationary_at = went_stationary_at.expect("track never became stationary");
    assert!(
        (15..=21).contains(&stationary_at),
        "stationary transition at frame {stationary_at}"
    );
}

/// Detections cease mid-stream: the track goes Lost, survives until
/// max_age is exceeded, then is deleted
#[test]
fn test_object_leaves_frame() {
    let mut tracker = ObjectTracker::new(TrackerConfig::default());
    let bbox = BoundingBox::new(200, 100, 150, 300);

    for frame in 1..=10 {
        tracker.update(&[person_at(bbox)], frame);
    }
    assert_eq!(tracker.tracks().len(), 1);
    let track_id = tracker.tracks()[0].id;

    // Frames 11..=40: missing but within max_age = 30, stays Lost
    for frame in 11..=40 {
        let tracks = tracker.update(&[], frame);
        assert_eq!(tracks.len(), 1, "track deleted early at frame {frame}");
        assert_eq!(tracks[0].id, track_id);
        assert_eq!(tracks[0].state, TrackState::Lost);
        assert_eq!(tracks[0].frames_since_detection, (frame - 10) as u32);
    }

    // Frame 41: frames_since_detection exceeds max_age, track deleted
    let tracks = tracker.update(&[], 41);
    assert!(tracks.is_empty(), "track should be deleted after max_age");
}

/// Two well-separated objects keep distinct ids while both are visible
#[test]
fn test_two_objects_keep_distinct_tracks() {
    let mut tracker = ObjectTracker::new(TrackerConfig::default());
    let left = BoundingBox::new(50, 100, 60, 120);
    let right = BoundingBox::new(400, 100, 60, 120);

    for frame in 1..=10 {
        let tracks = tracker.update(&[person_at(left), person_at(right)], frame);
        assert_eq!(tracks.len(), 2);
    }
    let ids: Vec<_> = tracker.tracks().iter().map(|t| t.id).collect();
    assert_ne!(ids[0], ids[1]);
}

/// A moving object is followed by prediction and stays Active
#[test]
fn test_moving_object_stays_active() {
    let mut tracker = ObjectTracker::new(TrackerConfig::default());

    for frame in 1..=20 {
        let x = 50 + (frame as i32) * 10;
        let tracks = tracker.update(&[person_at(BoundingBox::new(x, 100, 60, 120))], frame);
        assert_eq!(tracks.len(), 1, "lost the moving object at frame {frame}");
        if frame >= 3 {
            assert_eq!(tracks[0].state, TrackState::Active);
            assert_eq!(tracks[0].frames_stationary, 0);
        }
    }
    // Velocity estimate points in the direction of motion
    let (vx, _) = tracker.tracks()[0].velocity;
    assert!(vx > 0.0, "expected positive x velocity, got {vx}");
}

/// A stationary object that starts moving again returns to Active
#[test]
fn test_stationary_resumes_active() {
    let mut tracker = ObjectTracker::new(TrackerConfig::default());
    let bbox = BoundingBox::new(200, 100, 80, 160);

    let mut frame = 0;
    for _ in 1..=25 {
        frame += 1;
        tracker.update(&[person_at(bbox)], frame);
    }
    assert_eq!(tracker.tracks()[0].state, TrackState::Stationary);

    // Large jumps reset the stationary counter
    for step in 1..=3 {
        frame += 1;
        let moved = BoundingBox::new(200 + step * 30, 100, 80, 160);
        tracker.update(&[person_at(moved)], frame);
    }
    assert_eq!(tracker.tracks()[0].state, TrackState::Active);
    assert_eq!(tracker.tracks()[0].frames_stationary, 0);
}
