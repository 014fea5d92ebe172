//! Mathematical utilities and nalgebra extensions for attitude estimation

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Convert degrees to radians
    fn deg_to_rad(&self) -> Vector3<f32>;

    /// Convert radians to degrees
    fn rad_to_deg(&self) -> Vector3<f32>;

    /// True if every component is finite
    fn is_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f32> {
    fn deg_to_rad(&self) -> Vector3<f32> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f32> {
        *self * RAD_TO_DEG
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Extension trait for UnitQuaternion operations
pub trait QuaternionExt {
    /// Convert quaternion to Euler angles (roll, pitch, yaw) in degrees
    fn to_euler_degrees(&self) -> Vector3<f32>;

    /// Create quaternion from Euler angles in degrees (ZYX: yaw, then pitch, then roll)
    fn from_euler_degrees(roll: f32, pitch: f32, yaw: f32) -> UnitQuaternion<f32>;

    /// Same rotation with a non-negative scalar part
    fn with_positive_scalar(&self) -> UnitQuaternion<f32>;
}

impl QuaternionExt for UnitQuaternion<f32> {
    fn to_euler_degrees(&self) -> Vector3<f32> {
        let (roll, pitch, yaw) = self.euler_angles();
        Vector3::new(roll, pitch, yaw).rad_to_deg()
    }

    fn from_euler_degrees(roll: f32, pitch: f32, yaw: f32) -> UnitQuaternion<f32> {
        let euler_rad = Vector3::new(roll, pitch, yaw).deg_to_rad();
        UnitQuaternion::from_euler_angles(euler_rad.x, euler_rad.y, euler_rad.z)
    }

    fn with_positive_scalar(&self) -> UnitQuaternion<f32> {
        if self.w < 0.0 {
            UnitQuaternion::new_unchecked(-self.into_inner())
        } else {
            *self
        }
    }
}

/// Squared Euclidean norm of a raw quaternion
pub(crate) fn norm_squared(q: &Quaternion<f32>) -> f32 {
    q.w * q.w + q.i * q.i + q.j * q.j + q.k * q.k
}
