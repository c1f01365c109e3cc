//! Constant-velocity Kalman filter for bounding-box tracking
//!
//! State vector `[cx, cy, w, h, vx, vy]`: box center, box dimensions, and
//! center velocity in pixels per frame. Only position and dimensions are
//! measured; velocity is inferred.

use nalgebra::{Matrix4, Matrix4x6, Matrix6, Matrix6x4, Vector4, Vector6};
use streamlens_common::BoundingBox;
use tracing::warn;

/// Inter-frame interval in seconds at the 5 fps processing cadence
const DT: f32 = 0.2;

const POSITION_UNCERTAINTY: f32 = 10.0;
const VELOCITY_UNCERTAINTY: f32 = 1000.0;
const PROCESS_NOISE: f32 = 0.01;
const MEASUREMENT_NOISE: f32 = 10.0;

/// Kalman filter over one tracked bounding box
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    /// State: [cx, cy, w, h, vx, vy]
    state: Vector6<f32>,
    /// State covariance
    covariance: Matrix6<f32>,
    /// State transition (constant velocity)
    transition: Matrix6<f32>,
    /// Measurement matrix (observes position and size, not velocity)
    measurement: Matrix4x6<f32>,
    /// Process noise covariance
    process_noise: Matrix6<f32>,
    /// Measurement noise covariance
    measurement_noise: Matrix4<f32>,
}

fn initial_covariance() -> Matrix6<f32> {
    Matrix6::from_diagonal(&Vector6::new(
        POSITION_UNCERTAINTY,
        POSITION_UNCERTAINTY,
        POSITION_UNCERTAINTY,
        POSITION_UNCERTAINTY,
        VELOCITY_UNCERTAINTY,
        VELOCITY_UNCERTAINTY,
    ))
}

fn measurement_vector(bbox: &BoundingBox) -> Vector4<f32> {
    let (cx, cy) = bbox.center();
    Vector4::new(cx, cy, bbox.w as f32, bbox.h as f32)
}

impl KalmanFilter {
    /// Initialize from a first detection with zero velocity
    #[must_use]
    pub fn new(initial_bbox: &BoundingBox) -> Self {
        let z = measurement_vector(initial_bbox);
        let state = Vector6::new(z[0], z[1], z[2], z[3], 0.0, 0.0);

        let mut transition = Matrix6::identity();
        transition[(0, 4)] = DT;
        transition[(1, 5)] = DT;

        let mut measurement = Matrix4x6::zeros();
        measurement[(0, 0)] = 1.0;
        measurement[(1, 1)] = 1.0;
        measurement[(2, 2)] = 1.0;
        measurement[(3, 3)] = 1.0;

        Self {
            state,
            covariance: initial_covariance(),
            transition,
            measurement,
            process_noise: Matrix6::identity() * PROCESS_NOISE,
            measurement_noise: Matrix4::identity() * MEASUREMENT_NOISE,
        }
    }

    /// Advance the state one frame under the constant-velocity model
    pub fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    /// Correct the state with a detection measurement.
    ///
    /// If the innovation covariance cannot be inverted the filter resets to
    /// the measurement with zero velocity and initial covariance, so the
    /// track never enters an unrecoverable numerical state.
    pub fn update(&mut self, measurement: &BoundingBox) {
        let z = measurement_vector(measurement);
        let innovation = z - self.measurement * self.state;
        let innovation_cov =
            self.measurement * self.covariance * self.measurement.transpose()
                + self.measurement_noise;

        match innovation_cov.try_inverse() {
            Some(inv) => {
                let gain: Matrix6x4<f32> =
                    self.covariance * self.measurement.transpose() * inv;
                self.state += gain * innovation;
                self.covariance =
                    (Matrix6::identity() - gain * self.measurement) * self.covariance;
            }
            None => {
                warn!(
                    "Kalman innovation covariance singular, resetting filter to measurement {:?}",
                    measurement
                );
                self.state = Vector6::new(z[0], z[1], z[2], z[3], 0.0, 0.0);
                self.covariance = initial_covariance();
            }
        }
    }

    /// Current state as a bounding box
    #[must_use]
    pub fn bbox(&self) -> BoundingBox {
        let (cx, cy, w, h) = (self.state[0], self.state[1], self.state[2], self.state[3]);
        BoundingBox::new(
            (cx - w / 2.0) as i32,
            (cy - h / 2.0) as i32,
            w as i32,
            h as i32,
        )
    }

    /// Current velocity estimate in pixels per frame
    #[must_use]
    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_matches_bbox() {
        let bbox = BoundingBox::new(100, 200, 40, 60);
        let kf = KalmanFilter::new(&bbox);
        assert_eq!(kf.bbox(), bbox);
        assert_eq!(kf.velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_predict_zero_velocity_keeps_center() {
        let bbox = BoundingBox::new(100, 200, 40, 60);
        let mut kf = KalmanFilter::new(&bbox);
        kf.predict();
        let predicted = kf.bbox();
        let (cx0, cy0) = bbox.center();
        let (cx1, cy1) = predicted.center();
        assert!((cx0 - cx1).abs() < 1.0);
        assert!((cy0 - cy1).abs() < 1.0);
    }

    #[test]
    fn test_update_moves_toward_measurement() {
        let start = BoundingBox::new(100, 100, 40, 40);
        let mut kf = KalmanFilter::new(&start);
        kf.predict();
        let target = BoundingBox::new(140, 100, 40, 40);
        kf.update(&target);

        let (cx, _) = kf.bbox().center();
        let (start_cx, _) = start.center();
        let (target_cx, _) = target.center();
        assert!(cx > start_cx, "state did not move toward the measurement");
        assert!(cx <= target_cx + 1.0);
    }

    #[test]
    fn test_velocity_converges_on_constant_motion() {
        let mut kf = KalmanFilter::new(&BoundingBox::new(0, 0, 40, 40));
        for i in 1..30 {
            kf.predict();
            kf.update(&BoundingBox::new(i * 10, 0, 40, 40));
        }
        let (vx, vy) = kf.velocity();
        assert!(vx > 0.0, "x velocity should be positive, got {vx}");
        assert!(vy.abs() < vx, "y velocity should be negligible");
    }

    #[test]
    fn test_filter_recovers_after_many_updates() {
        // Repeated predict/update cycles must not drive the covariance into
        // a state that breaks future updates.
        let mut kf = KalmanFilter::new(&BoundingBox::new(50, 50, 20, 20));
        for _ in 0..500 {
            kf.predict();
            kf.update(&BoundingBox::new(50, 50, 20, 20));
        }
        let bbox = kf.bbox();
        assert!((bbox.x - 50).abs() <= 1);
        assert!((bbox.y - 50).abs() <= 1);
    }
}
