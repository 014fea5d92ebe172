//! Quaternion complementary filter
//!
//! Gyroscope rates are integrated into the orientation quaternion; the
//! cross product between the measured accelerometer direction and the
//! gravity direction predicted from the current quaternion is fed back as a
//! proportional rate correction and accumulated into a persistent gyro bias
//! integral.
//!
//! # Frames
//! Body frame is X forward, Y right, Z down. The quaternion rotates body
//! vectors into the NED reference frame. A level, stationary vehicle reads
//! `(0, 0, -g)` on the accelerometer.

use nalgebra::{Quaternion, Rotation3, UnitQuaternion, Vector3};

use crate::calibration::BoardRotation;
use crate::math::{DEG_TO_RAD, Vector3Ext, norm_squared};
use crate::types::{Attitude, Gains};

/// Floor on the integration time step in seconds
///
/// Used for duplicate or backwards ticks and the very first cycle, and bounds
/// the `kp / dt` proportional term.
pub const MIN_DT: f32 = 0.001;

/// Ceiling on the integration time step in seconds
///
/// A stalled loop resumes with at most this much gyro integration.
pub const MAX_DT: f32 = 0.1;

/// Quaternion magnitude below which the state is considered corrupted
pub const MIN_QUATERNION_NORM: f32 = 1e-3;

/// Filter state owned by the fusion task
///
/// Holds the orientation quaternion and the gyro bias integral. Nothing but
/// the fusion task mutates it; the task passes it by reference into each
/// cycle's update.
#[derive(Debug, Clone)]
pub struct FusionState {
    /// Orientation, scalar-first, unit length and `w >= 0` after every update
    quaternion: Quaternion<f32>,
    /// Gyro bias integral in deg/s, added to the raw gyro upstream
    gyro_bias: Vector3<f32>,
    /// Clock reading of the previous fused cycle
    last_tick_ms: Option<u64>,
    /// Number of times the quaternion was reset to identity
    degenerate_resets: u32,
}

impl FusionState {
    /// Identity orientation, zero bias
    pub fn new() -> Self {
        Self::with_gyro_bias(Vector3::zeros())
    }

    /// Identity orientation, bias integral seeded from persisted calibration
    pub fn with_gyro_bias(gyro_bias: Vector3<f32>) -> Self {
        Self {
            quaternion: Quaternion::identity(),
            gyro_bias,
            last_tick_ms: None,
            degenerate_resets: 0,
        }
    }

    /// Current raw orientation quaternion
    pub fn quaternion(&self) -> Quaternion<f32> {
        self.quaternion
    }

    /// Overwrite the orientation (no normalization is performed here)
    pub fn set_quaternion(&mut self, quaternion: Quaternion<f32>) {
        self.quaternion = quaternion;
    }

    pub fn gyro_bias(&self) -> Vector3<f32> {
        self.gyro_bias
    }

    pub fn set_gyro_bias(&mut self, gyro_bias: Vector3<f32>) {
        self.gyro_bias = gyro_bias;
    }

    pub fn degenerate_resets(&self) -> u32 {
        self.degenerate_resets
    }

    /// Time step since the previous tick, in seconds, within [`MIN_DT`, `MAX_DT`]
    pub fn time_step(&mut self, now_ms: u64) -> f32 {
        let dt = match self.last_tick_ms {
            Some(last) if now_ms > last => (now_ms - last) as f32 / 1000.0,
            _ => MIN_DT,
        };
        self.mark_tick(now_ms);
        dt.clamp(MIN_DT, MAX_DT)
    }

    /// Record a cycle that skipped the filter step
    ///
    /// The next [`time_step`](Self::time_step) measures from here, not from
    /// the last fused cycle.
    pub fn mark_tick(&mut self, now_ms: u64) {
        self.last_tick_ms = Some(now_ms);
    }

    /// Gravity direction expected on the accelerometer for the current orientation
    ///
    /// The negated third row of the body-to-reference rotation matrix.
    pub fn predicted_gravity(&self) -> Vector3<f32> {
        let q = &self.quaternion;
        Vector3::new(
            -2.0 * (q.i * q.k - q.w * q.j),
            -2.0 * (q.j * q.k + q.w * q.i),
            -(q.w * q.w - q.i * q.i - q.j * q.j + q.k * q.k),
        )
    }

    /// Run one filter step
    ///
    /// # Arguments
    /// * `gyroscope` - Body rates in deg/s, bias integral already applied
    /// * `accelerometer` - Specific force, any unit (only the direction is used)
    /// * `gains` - Active gains from the scheduler
    /// * `delta_time` - Time step in seconds, clamped to [`MIN_DT`, `MAX_DT`]
    ///
    /// Never fails: a degenerate quaternion is reset to identity in place.
    pub fn update(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        gains: &Gains,
        delta_time: f32,
    ) {
        let delta_time = if delta_time >= MIN_DT {
            delta_time.min(MAX_DT)
        } else {
            MIN_DT
        };

        // Only valid near 1 g; high dynamic acceleration leaks into the error
        let error = accelerometer.cross(&self.predicted_gravity()) / accelerometer.norm();

        // A non-finite error must not poison the persistent integral
        if error.is_finite() {
            self.gyro_bias.x += error.x * gains.ki;
            self.gyro_bias.y += error.y * gains.ki;
        }
        if gyroscope.z.is_finite() {
            self.gyro_bias.z -= gyroscope.z * gains.yaw_bias_rate;
        }

        let rate = gyroscope + error * (gains.kp / delta_time);
        self.integrate_quaternion(rate, delta_time);
        self.normalize();
    }

    /// Orientation as published, with the board mounting rotation taken out
    pub fn attitude(&self, board_rotation: &BoardRotation) -> Attitude {
        let fused = UnitQuaternion::new_unchecked(self.quaternion);
        match board_rotation {
            BoardRotation::Identity => Attitude::from_quaternion(fused),
            BoardRotation::Rotated { matrix, .. } => {
                let body = fused.to_rotation_matrix().into_inner() * matrix.transpose();
                let body = Rotation3::from_matrix_unchecked(body);
                Attitude::from_quaternion(UnitQuaternion::from_rotation_matrix(&body))
            }
        }
    }

    /// First-order integration of dq/dt = 0.5 * q * ω
    fn integrate_quaternion(&mut self, rate: Vector3<f32>, delta_time: f32) {
        let half_rate = rate * (DEG_TO_RAD * 0.5);
        let rate_quaternion = Quaternion::from_parts(0.0, half_rate);
        let derivative = self.quaternion * rate_quaternion;
        self.quaternion += derivative * delta_time;
    }

    /// Keep `w >= 0`, renormalize, and reset on a corrupted magnitude
    fn normalize(&mut self) {
        if self.quaternion.w < 0.0 {
            self.quaternion = -self.quaternion;
        }

        let norm = libm::sqrtf(norm_squared(&self.quaternion));
        if norm.is_finite() && norm >= MIN_QUATERNION_NORM {
            self.quaternion /= norm;
        } else {
            self.quaternion = Quaternion::identity();
            self.degenerate_resets = self.degenerate_resets.wrapping_add(1);
            log_warn!(
                "attitude quaternion degenerate, reset to identity ({} resets)",
                self.degenerate_resets
            );
        }
    }
}

impl Default for FusionState {
    fn default() -> Self {
        Self::new()
    }
}
