//! Per-stream analytics supervisor
//!
//! One task per stream owns all of that stream's analytics state: motion
//! detector, detection pipeline, and tracker. Frames are pulled from a
//! [`FrameSource`], processed strictly in order, and emitted as rendered
//! frames with a track snapshot. Detection configuration is hot-reloaded
//! through a watch channel and read once per frame, so no frame runs
//! half-configured.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use streamlens_common::{BoundingBox, Frame};
use streamlens_detection::{
    filter_detections, Detector, StreamDetectionConfig, DEFAULT_NMS_IOU,
};
use streamlens_motion::{MotionDetector, MotionDetectorConfig};
use streamlens_tracking::{ObjectTracker, TrackSnapshot, TrackerConfig};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stationary tracks are re-inferred once every this many frames
/// (10 s at 5 fps)
const STATIONARY_REFRESH_INTERVAL: u64 = 50;

/// Stream supervision errors
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("frame source failed: {0}")]
    Source(#[from] std::io::Error),
}

/// Supplier of decoded frames for one stream.
///
/// `Ok(None)` signals end of stream. The supervisor makes no assumptions
/// about the decoder behind this trait.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> std::io::Result<Option<Frame>>;
}

/// Per-frame output: the rendered frame plus the live tracking state
#[derive(Debug)]
pub struct FrameOutput {
    pub stream_id: Uuid,
    pub frame: Frame,
    pub tracks: Vec<TrackSnapshot>,
}

/// Static per-stream analytics parameters
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub stream_id: Uuid,
    pub detection: StreamDetectionConfig,
    pub motion: MotionDetectorConfig,
    pub tracker: TrackerConfig,
}

impl StreamSpec {
    /// Spec with default analytics parameters
    #[must_use]
    pub fn new(stream_id: Uuid, detection: StreamDetectionConfig) -> Self {
        Self {
            stream_id,
            detection,
            motion: MotionDetectorConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// Owns one stream's analytics state and processes its frames in order
pub struct StreamSupervisor {
    stream_id: Uuid,
    motion: MotionDetector,
    tracker: ObjectTracker,
    detector: Detector,
    config_rx: watch::Receiver<StreamDetectionConfig>,
    /// Frame number of the last stationary re-inference, per track
    stationary_refresh: HashMap<Uuid, u64>,
    /// Detection-session failures are reported once, not per frame
    inference_fault_reported: bool,
}

impl StreamSupervisor {
    fn new(
        spec: &StreamSpec,
        detector: Detector,
        config_rx: watch::Receiver<StreamDetectionConfig>,
    ) -> Self {
        Self {
            stream_id: spec.stream_id,
            motion: MotionDetector::new(spec.motion.clone()),
            tracker: ObjectTracker::new(spec.tracker.clone()),
            detector,
            config_rx,
            stationary_refresh: HashMap::new(),
            inference_fault_reported: false,
        }
    }

    /// Process one frame: motion, region detection, tracking, rendering.
    ///
    /// CPU-bound and synchronous; the run loop wraps it in
    /// `block_in_place`.
    fn process_frame(&mut self, frame: &mut Frame) -> Vec<TrackSnapshot> {
        let config = self.config_rx.borrow().clone();
        let regions = self.motion.extract(frame);

        let mut detections = Vec::new();
        if config.enabled {
            // Work set: one cropped inference per motion region, plus
            // stationary tracks due for their reduced-cadence refresh.
            let mut work: Vec<BoundingBox> = regions.iter().map(|r| r.bbox).collect();
            let due: Vec<(Uuid, BoundingBox)> = self
                .tracker
                .stationary_objects()
                .filter(|t| {
                    let last = self.stationary_refresh.get(&t.id).copied().unwrap_or(0);
                    frame.frame_number.saturating_sub(last) >= STATIONARY_REFRESH_INTERVAL
                })
                .map(|t| (t.id, t.bbox))
                .collect();
            for (track_id, bbox) in due {
                self.stationary_refresh.insert(track_id, frame.frame_number);
                work.push(bbox);
            }
            debug!(
                "frame {}: {} motion regions, {} inference calls",
                frame.frame_number,
                regions.len(),
                work.len()
            );

            for region in work {
                match self.detector.detect_region(frame, region) {
                    Ok(found) => detections.extend(found),
                    Err(e) => {
                        // Report once, degrade to empty detections; the
                        // tracker still predicts forward.
                        if !self.inference_fault_reported {
                            error!(
                                "detection failed on stream {} frame {}: {e}",
                                self.stream_id, frame.frame_number
                            );
                            self.inference_fault_reported = true;
                        }
                    }
                }
            }
        }

        // Full-frame dedupe and the live config filter
        let detections = filter_detections(detections, &config, DEFAULT_NMS_IOU);

        self.tracker.update(&detections, frame.frame_number);

        // Forget refresh bookkeeping for deleted tracks
        let live: HashSet<Uuid> = self.tracker.tracks().iter().map(|t| t.id).collect();
        self.stationary_refresh.retain(|id, _| live.contains(id));

        // Snapshot carries only boxes inside the frame; predicted boxes
        // can drift out while a track is lost.
        let mut snapshot = self.tracker.snapshot();
        snapshot.retain_mut(|s| match s.bbox.clip(frame.width, frame.height) {
            Some(clipped) => {
                s.bbox = clipped;
                true
            }
            None => false,
        });

        streamlens_render::draw_motion_regions(frame, &regions);
        streamlens_render::draw_tracks(frame, &snapshot);
        snapshot
    }

    /// Drive the supervisor until end-of-stream, consumer hangup, or
    /// shutdown. Cancellation is cooperative and checked at every
    /// suspension point.
    pub async fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        output: mpsc::Sender<FrameOutput>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("stream supervisor started: stream={}", self.stream_id);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("stream {} shutting down", self.stream_id);
                        break;
                    }
                }
                next = source.next_frame() => {
                    match next {
                        Ok(Some(mut frame)) => {
                            let frame_number = frame.frame_number;
                            let result = tokio::task::block_in_place(|| {
                                std::panic::catch_unwind(AssertUnwindSafe(|| {
                                    self.process_frame(&mut frame)
                                }))
                            });
                            match result {
                                Ok(tracks) => {
                                    let out = FrameOutput {
                                        stream_id: self.stream_id,
                                        frame,
                                        tracks,
                                    };
                                    // Output delivery is a suspension point:
                                    // remain cancellable while the consumer
                                    // is slow.
                                    tokio::select! {
                                        sent = output.send(out) => {
                                            if sent.is_err() {
                                                info!("stream {} consumer dropped, stopping", self.stream_id);
                                                break;
                                            }
                                        }
                                        changed = shutdown.changed() => {
                                            if changed.is_err() || *shutdown.borrow() {
                                                info!("stream {} shutting down", self.stream_id);
                                                break;
                                            }
                                        }
                                    }
                                }
                                Err(_) => {
                                    error!(
                                        "unexpected panic on stream {} frame {}, frame skipped",
                                        self.stream_id, frame_number
                                    );
                                }
                            }
                        }
                        Ok(None) => {
                            info!("stream {} reached end of stream", self.stream_id);
                            break;
                        }
                        Err(e) => {
                            error!("stream {} frame source failed: {e}", self.stream_id);
                            break;
                        }
                    }
                }
            }
        }
        // Dropping the supervisor releases the tracker (and its Kalman
        // filters), the motion model, and the detector's session handle.
        info!("stream supervisor stopped: stream={}", self.stream_id);
    }
}

/// Handle to a running stream task
struct StreamHandle {
    config_tx: watch::Sender<StreamDetectionConfig>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Process-wide registry of running stream tasks
#[derive(Default)]
pub struct StreamManager {
    streams: Mutex<HashMap<Uuid, StreamHandle>>,
}

impl StreamManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a supervisor task for `spec`, pulling frames from `source`
    /// and emitting into `output`
    pub async fn start_stream(
        &self,
        spec: StreamSpec,
        detector: Detector,
        source: Box<dyn FrameSource>,
        output: mpsc::Sender<FrameOutput>,
    ) -> Result<(), StreamError> {
        let mut streams = self.streams.lock().await;
        if streams.contains_key(&spec.stream_id) {
            return Err(StreamError::AlreadyRunning(spec.stream_id));
        }

        let (config_tx, config_rx) = watch::channel(spec.detection.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = StreamSupervisor::new(&spec, detector, config_rx);
        let task = tokio::spawn(supervisor.run(source, output, shutdown_rx));

        streams.insert(
            spec.stream_id,
            StreamHandle {
                config_tx,
                shutdown_tx,
                task,
            },
        );
        info!("stream {} registered", spec.stream_id);
        Ok(())
    }

    /// Stop a stream and wait for its task to finish.
    ///
    /// Returns false when the stream is not running.
    pub async fn stop_stream(&self, stream_id: Uuid) -> bool {
        let handle = self.streams.lock().await.remove(&stream_id);
        let Some(handle) = handle else {
            warn!("stop requested for unknown stream {stream_id}");
            return false;
        };
        let _ = handle.shutdown_tx.send(true);
        if handle.task.await.is_err() {
            error!("stream {stream_id} task panicked during shutdown");
        }
        info!("stream {stream_id} stopped");
        true
    }

    /// Atomically replace a stream's detection config.
    ///
    /// The supervisor picks the new value up at its next frame boundary.
    /// Returns false when the stream is not running.
    pub async fn update_detection_config(
        &self,
        stream_id: Uuid,
        config: StreamDetectionConfig,
    ) -> bool {
        let streams = self.streams.lock().await;
        match streams.get(&stream_id) {
            Some(handle) => {
                let applied = handle.config_tx.send(config).is_ok();
                if applied {
                    info!("detection config updated live for stream {stream_id}");
                }
                applied
            }
            None => false,
        }
    }

    /// Whether a stream task is currently registered
    pub async fn is_active(&self, stream_id: Uuid) -> bool {
        self.streams.lock().await.contains_key(&stream_id)
    }

    /// Stop every running stream
    pub async fn shutdown_all(&self) {
        let ids: Vec<Uuid> = self.streams.lock().await.keys().copied().collect();
        for id in ids {
            self.stop_stream(id).await;
        }
    }
}
