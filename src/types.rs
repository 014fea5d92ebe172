//! Core types and configuration for the attitude estimation task

use nalgebra::{UnitQuaternion, Vector3};

use crate::axes::AxisMap;
use crate::math::QuaternionExt;

/// Complementary filter gains
///
/// `kp` and `ki` act on the accelerometer-derived gravity error; `yaw_bias_rate`
/// weakly drives the yaw rate towards zero, since gravity cannot observe yaw.
///
/// # Example
/// ```
/// use attitude_fusion::Gains;
///
/// let gains = Gains {
///     kp: 0.05,
///     ki: 0.0001,
///     yaw_bias_rate: 0.00001,
/// };
/// assert!(gains.kp > gains.ki);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gains {
    /// Proportional gain on the gravity error
    pub kp: f32,
    /// Integral gain feeding the roll/pitch gyro bias estimate
    pub ki: f32,
    /// Rate at which the yaw bias estimate pulls measured yaw rate to zero
    pub yaw_bias_rate: f32,
}

impl Gains {
    /// Aggressive gains used while the filter converges from an unknown attitude
    pub const FAST_CONVERGE: Gains = Gains {
        kp: 1.0,
        ki: 0.9,
        yaw_bias_rate: 0.23,
    };
}

/// Gain schedule mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GainMode {
    /// Fixed high gains, vehicle assumed stationary
    #[default]
    FastConverge,
    /// Gains from the calibration store
    Steady,
}

impl GainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GainMode::FastConverge => "fast-converge",
            GainMode::Steady => "steady",
        }
    }
}

/// Arming status reported by the flight status object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmedState {
    #[default]
    Disarmed,
    /// Arming sequence in progress, operator is holding the vehicle still
    Arming,
    Armed,
}

/// Alarms raised by this task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemAlarm {
    Attitude,
}

/// Alarm severity, in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmSeverity {
    Ok,
    Warning,
    Error,
    Critical,
}

/// Temperature readings in degrees Celsius (telemetry only)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Temperatures {
    pub gyro: f32,
    pub accel: f32,
}

/// One cycle's worth of scaled sensor data
///
/// Produced fresh by the sensor aggregator every cycle and handed to the
/// estimator and the publisher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Accelerometer mean in m/s², body frame (level and still reads `(0, 0, -g)`)
    pub accels: Vector3<f32>,
    /// Gyroscope mean in deg/s, body frame, bias integral applied when enabled
    pub gyros: Vector3<f32>,
    /// Last magnetometer reading in raw counts, body frame
    pub magnetometers: Vector3<f32>,
    pub temperature: Temperatures,
    /// Number of accelerometer samples averaged this cycle
    pub accel_samples: u32,
    /// Number of gyroscope samples averaged this cycle
    pub gyro_samples: u32,
}

/// Published attitude estimate
///
/// The quaternion is scalar-first `(w, x, y, z)` and rotates body-frame
/// vectors into the NED reference frame; `w` is never negative. The Euler
/// angles are derived from it (ZYX order) and expressed in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub quaternion: UnitQuaternion<f32>,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Attitude {
    /// Build the published attitude from a body-to-reference rotation
    pub fn from_quaternion(quaternion: UnitQuaternion<f32>) -> Self {
        let quaternion = quaternion.with_positive_scalar();
        let euler = quaternion.to_euler_degrees();
        Self {
            quaternion,
            roll: euler.x,
            pitch: euler.y,
            yaw: euler.z,
        }
    }
}

impl Default for Attitude {
    fn default() -> Self {
        Self::from_quaternion(UnitQuaternion::identity())
    }
}

/// Affine raw-to-Celsius conversion: `reference_celsius + (raw - reference_counts) / counts_per_degree`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureCalibration {
    pub reference_celsius: f32,
    pub reference_counts: f32,
    pub counts_per_degree: f32,
}

impl TemperatureCalibration {
    /// MPU-6050 style gyro: 35 °C at -13200 counts, 280 counts per °C
    pub const GYRO: TemperatureCalibration = TemperatureCalibration {
        reference_celsius: 35.0,
        reference_counts: -13200.0,
        counts_per_degree: 280.0,
    };

    /// BMA180 style accelerometer: 25 °C at 2 counts, 2 counts per °C
    pub const ACCEL: TemperatureCalibration = TemperatureCalibration {
        reference_celsius: 25.0,
        reference_counts: 2.0,
        counts_per_degree: 2.0,
    };

    pub fn celsius(&self, raw: i16) -> f32 {
        self.reference_celsius + (f32::from(raw) - self.reference_counts) / self.counts_per_degree
    }
}

/// Gain scheduler settings
///
/// # Example
/// ```
/// use attitude_fusion::{Gains, SchedulerConfig};
///
/// let config = SchedulerConfig {
///     settle_ms: 500,
///     fast_converge_until_ms: 4000,
///     fast_gains: Gains::FAST_CONVERGE,
/// };
/// assert!(config.settle_ms < config.fast_converge_until_ms);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Time since boot before fast convergence may start (sensor start-up garbage)
    pub settle_ms: u64,
    /// Time since boot at which fast convergence ends
    pub fast_converge_until_ms: u64,
    /// Gains used during fast convergence, regardless of stored calibration
    pub fast_gains: Gains,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            settle_ms: 1000,
            fast_converge_until_ms: 7000,
            fast_gains: Gains::FAST_CONVERGE,
        }
    }
}

/// Sensor aggregator settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorConfig {
    /// Time a FIFO may stay empty, polled with cooperative yields, before
    /// the cycle gives up
    pub max_wait_ms: u32,
    pub accel_axes: AxisMap,
    pub gyro_axes: AxisMap,
    pub mag_axes: AxisMap,
    pub accel_temperature: TemperatureCalibration,
    pub gyro_temperature: TemperatureCalibration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 20,
            accel_axes: AxisMap::IDENTITY,
            gyro_axes: AxisMap::GYRO_BOARD,
            mag_axes: AxisMap::MAG_BOARD,
            accel_temperature: TemperatureCalibration::ACCEL,
            gyro_temperature: TemperatureCalibration::GYRO,
        }
    }
}

/// Complete task configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TaskConfig {
    pub scheduler: SchedulerConfig,
    pub aggregator: AggregatorConfig,
}
