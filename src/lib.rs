#![cfg_attr(not(test), no_std)]

//! Attitude Fusion - real-time attitude estimation task for flight controllers
//!
//! This library estimates a vehicle's orientation from oversampled
//! accelerometer and gyroscope FIFOs using a quaternion complementary filter
//! with an adaptive gyroscope bias integral. Filter gains are scheduled
//! between an aggressive fast-converge set (right after boot, or while
//! arming) and the tunable gains held in a shared calibration store.
//!
//! # Features
//!
//! - Quaternion complementary filter with gravity-error feedback
//! - Persistent gyro bias integral, weak yaw rate-to-zero correction
//! - Oversampled, overflow-free sensor averaging with axis remapping
//! - Gain scheduling on time since boot and arming status
//! - Torn-update-free calibration store shared across execution contexts
//! - Degenerate-state recovery: the filter never fails, it resets
//! - `no_std` and executor-agnostic (`async` task loop), optional `defmt` logging
//!
//! # Frames
//!
//! Body frame X forward, Y right, Z down; reference frame NED. Rates are in
//! deg/s, the published quaternion is scalar-first with `w >= 0`, Euler
//! angles are in degrees.
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use attitude_fusion::{BoardRotation, FusionState, Gains};
//!
//! let mut fusion = FusionState::new();
//!
//! // Level and still: gravity reads along -Z
//! let gyroscope = Vector3::new(0.0, 0.0, 0.0);     // deg/s
//! let accelerometer = Vector3::new(0.0, 0.0, -9.81); // m/s²
//!
//! let dt = fusion.time_step(1000);
//! fusion.update(gyroscope, accelerometer, &Gains::FAST_CONVERGE, dt);
//!
//! let attitude = fusion.attitude(&BoardRotation::Identity);
//! assert!(attitude.roll.abs() < 1e-3);
//! ```
//!
//! The full periodic pipeline (sensors, scheduler, calibration, alarms and
//! watchdog) is [`AttitudeTask`].

#[macro_use]
mod logging;

mod axes;
pub mod calibration;
mod error;
pub mod estimator;
mod math;
pub mod scheduler;
pub mod sensors;
pub mod task;
mod types;

// Re-export all public types and functions
pub use axes::{Axis, AxisMap};
pub use calibration::{AttitudeSettings, BoardRotation, CalibrationSnapshot, CalibrationStore};
pub use error::{SensorError, SensorKind};
pub use estimator::{FusionState, MAX_DT, MIN_DT, MIN_QUATERNION_NORM};
pub use math::{DEG_TO_RAD, QuaternionExt, RAD_TO_DEG, Vector3Ext};
pub use scheduler::GainScheduler;
pub use sensors::{BusFault, FifoSensor, Magnetometer, RawSample, SensorAggregator};
pub use task::{
    Alarms, AttitudePublisher, AttitudeTask, Clock, CycleOutcome, FlightStatusSource,
    TaskEnvironment, TaskStats, Watchdog,
};
pub use types::*;
