//! Calibration store: tunable gains, biases and board mounting rotation
//!
//! Settings arrive asynchronously from a configuration-change event that may
//! run in another execution context (e.g. a communications task). The store
//! derives a complete [`CalibrationSnapshot`] from them and swaps it in under a
//! critical-section mutex, so the fusion task always sees either the old or
//! the new snapshot, never a mix of the two.
//!
//! # Example
//! ```
//! use attitude_fusion::{AttitudeSettings, CalibrationStore};
//!
//! let store = CalibrationStore::new(&AttitudeSettings::default());
//! let before = store.snapshot();
//!
//! // Called from the settings-updated callback
//! store.apply(&AttitudeSettings {
//!     accel_kp: 0.1,
//!     board_rotation: [0.0, 0.0, 90.0],
//!     ..Default::default()
//! });
//!
//! let after = store.snapshot();
//! assert_eq!(after.gains.kp, 0.1);
//! assert!(after.generation > before.generation);
//! assert!(!after.board_rotation.is_identity());
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::math::QuaternionExt;
use crate::types::Gains;

/// Persisted gyro bias is stored in hundredths of a degree per second
const GYRO_BIAS_SCALE: f32 = 100.0;

/// Attitude settings as delivered by a configuration-change event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeSettings {
    /// Proportional gain on the accelerometer gravity error
    pub accel_kp: f32,
    /// Integral gain for the roll/pitch gyro bias estimate
    pub accel_ki: f32,
    /// Weak yaw rate-to-zero bias rate
    pub yaw_bias_rate: f32,
    /// Gyro gain, carried for consumers; the fusion path uses the driver scale
    pub gyro_gain: f32,
    /// Accelerometer bias in raw counts, sensor frame
    pub accel_bias: [i16; 3],
    /// Gyro bias in hundredths of deg/s, body frame
    pub gyro_bias: [i16; 3],
    /// Force fast-converge gains while the vehicle is arming
    pub zero_during_arming: bool,
    /// Add the gyro bias integral to the published gyro rates
    pub bias_correct_gyro: bool,
    /// Board mounting rotation (roll, pitch, yaw) in degrees
    pub board_rotation: [f32; 3],
}

impl Default for AttitudeSettings {
    fn default() -> Self {
        Self {
            accel_kp: 0.05,
            accel_ki: 0.0001,
            yaw_bias_rate: 0.00001,
            gyro_gain: 0.42,
            accel_bias: [0; 3],
            gyro_bias: [0; 3],
            zero_during_arming: false,
            bias_correct_gyro: true,
            board_rotation: [0.0; 3],
        }
    }
}

/// Board mounting rotation relative to the airframe
///
/// The quaternion and matrix are always derived together from the same
/// mounting angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoardRotation {
    /// All mounting angles are zero, no rotation work is needed
    Identity,
    Rotated {
        quaternion: UnitQuaternion<f32>,
        matrix: Matrix3<f32>,
    },
}

impl BoardRotation {
    /// Derive the mounting rotation from (roll, pitch, yaw) in degrees
    pub fn from_rpy_degrees(rpy: [f32; 3]) -> Self {
        if rpy == [0.0; 3] {
            return BoardRotation::Identity;
        }

        let quaternion = UnitQuaternion::from_euler_degrees(rpy[0], rpy[1], rpy[2]);
        let matrix = quaternion.to_rotation_matrix().into_inner();
        BoardRotation::Rotated { quaternion, matrix }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, BoardRotation::Identity)
    }

    /// Rotation matrix, identity when no rotation is configured
    pub fn matrix(&self) -> Matrix3<f32> {
        match self {
            BoardRotation::Identity => Matrix3::identity(),
            BoardRotation::Rotated { matrix, .. } => *matrix,
        }
    }
}

/// Consistent, immutable view of the calibration parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSnapshot {
    /// Incremented by every settings update
    pub generation: u32,
    pub gains: Gains,
    pub gyro_gain: f32,
    pub accel_bias: Vector3<i32>,
    /// Initial gyro bias integral in deg/s
    pub gyro_bias: Vector3<f32>,
    pub zero_during_arming: bool,
    pub bias_correct_gyro: bool,
    pub board_rotation: BoardRotation,
}

impl CalibrationSnapshot {
    /// Derive a snapshot from raw settings
    pub fn from_settings(settings: &AttitudeSettings, generation: u32) -> Self {
        let [bx, by, bz] = settings.accel_bias;
        let [gx, gy, gz] = settings.gyro_bias;

        Self {
            generation,
            gains: Gains {
                kp: settings.accel_kp,
                ki: settings.accel_ki,
                yaw_bias_rate: settings.yaw_bias_rate,
            },
            gyro_gain: settings.gyro_gain,
            accel_bias: Vector3::new(i32::from(bx), i32::from(by), i32::from(bz)),
            gyro_bias: Vector3::new(f32::from(gx), f32::from(gy), f32::from(gz)) / GYRO_BIAS_SCALE,
            zero_during_arming: settings.zero_during_arming,
            bias_correct_gyro: settings.bias_correct_gyro,
            board_rotation: BoardRotation::from_rpy_degrees(settings.board_rotation),
        }
    }
}

/// Shared calibration store
///
/// Single external writer (the settings callback), readers take a by-value
/// snapshot once per cycle.
pub struct CalibrationStore {
    inner: Mutex<CriticalSectionRawMutex, Cell<CalibrationSnapshot>>,
}

impl CalibrationStore {
    /// Create the store and load the initial settings
    pub fn new(settings: &AttitudeSettings) -> Self {
        Self {
            inner: Mutex::new(Cell::new(CalibrationSnapshot::from_settings(settings, 0))),
        }
    }

    /// Settings-updated callback: re-derive everything and swap it in atomically
    pub fn apply(&self, settings: &AttitudeSettings) {
        // Derivation happens outside the critical section; only the swap is locked
        let mut next = CalibrationSnapshot::from_settings(settings, 0);
        self.inner.lock(|cell| {
            next.generation = cell.get().generation.wrapping_add(1);
            cell.set(next);
        });
        log_debug!("calibration updated, generation {}", next.generation);
    }

    /// Current snapshot
    pub fn snapshot(&self) -> CalibrationSnapshot {
        self.inner.lock(|cell| cell.get())
    }
}
