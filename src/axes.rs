//! Sensor axes remapping onto the estimator body frame
//!
//! The estimator works in a body frame with X forward, Y right and Z down.
//! Each sensor chip is soldered with its own axes, so every output axis is
//! taken from one sensor axis, optionally negated.
//!
//! On the reference board the gyroscope's X and Y are swapped and every axis
//! is negated, and the magnetometer is negated on all three axes. Those maps
//! are [`AxisMap::GYRO_BOARD`] and [`AxisMap::MAG_BOARD`].
//!
//! # Example
//! ```
//! use nalgebra::Vector3;
//! use attitude_fusion::AxisMap;
//!
//! let sensor = Vector3::new(1.0, 2.0, 3.0);
//! let body = AxisMap::GYRO_BOARD.apply(sensor);
//!
//! assert_eq!(body, Vector3::new(-2.0, -1.0, -3.0));
//! ```

use nalgebra::Vector3;

/// Sensor axis an output axis is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Signed axis permutation from sensor frame to body frame
///
/// `source[i]` names the sensor axis feeding body axis `i`, and `negate[i]`
/// flips its sign. Reflections are allowed: some magnetometers are mounted
/// so that the sensor frame is left-handed relative to the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisMap {
    pub source: [Axis; 3],
    pub negate: [bool; 3],
}

impl AxisMap {
    /// Sensor axes already match the body frame
    pub const IDENTITY: AxisMap = AxisMap {
        source: [Axis::X, Axis::Y, Axis::Z],
        negate: [false, false, false],
    };

    /// Body = (-sensor.y, -sensor.x, -sensor.z)
    pub const GYRO_BOARD: AxisMap = AxisMap {
        source: [Axis::Y, Axis::X, Axis::Z],
        negate: [true, true, true],
    };

    /// Body = (-sensor.x, -sensor.y, -sensor.z)
    pub const MAG_BOARD: AxisMap = AxisMap {
        source: [Axis::X, Axis::Y, Axis::Z],
        negate: [true, true, true],
    };

    /// Remap a sensor-frame vector into the body frame
    #[inline]
    pub fn apply(&self, sensor: Vector3<f32>) -> Vector3<f32> {
        Vector3::from_fn(|i, _| {
            let value = sensor[self.source[i].index()];
            if self.negate[i] { -value } else { value }
        })
    }

    /// True when the map is a proper rotation (no reflection)
    pub fn is_proper_rotation(&self) -> bool {
        let mut used = [false; 3];
        for axis in self.source {
            used[axis.index()] = true;
        }
        if used.contains(&false) {
            return false;
        }

        // Permutation parity times the sign flips gives the determinant
        let [a, b, c] = self.source.map(Axis::index);
        let even_permutation = (a, b, c) == (0, 1, 2) || (a, b, c) == (1, 2, 0) || (a, b, c) == (2, 0, 1);
        let flips = self.negate.iter().filter(|n| **n).count();
        even_permutation == (flips % 2 == 0)
    }
}

impl Default for AxisMap {
    fn default() -> Self {
        Self::IDENTITY
    }
}
