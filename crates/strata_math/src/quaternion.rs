//! Quaternion for 3D rotations

use core::ops::{Mul, MulAssign};

use crate::consts::FRAC_PI_2;
use crate::matrix::{Mat3, Mat4};
use crate::vector::{Vec3, Vec4};

/// Quaternion representing a 3D rotation
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    #[inline]
    pub const fn from_vec4(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }

    /// Create from axis and angle (radians)
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize();
        if axis.length_squared() == 0.0 {
            return Self::IDENTITY;
        }
        let (sin, cos) = (angle * 0.5).sin_cos();
        Self::new(axis.x * sin, axis.y * sin, axis.z * sin, cos)
    }

    /// Create from Euler angles in radians
    ///
    /// `x` is pitch, `y` is yaw and `z` is roll. The resulting rotation
    /// applies roll, then pitch, then yaw.
    pub fn from_angles(x: f32, y: f32, z: f32) -> Self {
        let (sin_z, cos_z) = (z * 0.5).sin_cos();
        let (sin_y, cos_y) = (y * 0.5).sin_cos();
        let (sin_x, cos_x) = (x * 0.5).sin_cos();

        let cos_y_cos_z = cos_y * cos_z;
        let sin_y_sin_z = sin_y * sin_z;
        let cos_y_sin_z = cos_y * sin_z;
        let sin_y_cos_z = sin_y * cos_z;

        Self::new(
            cos_y_cos_z * sin_x + sin_y_sin_z * cos_x,
            sin_y_cos_z * cos_x + cos_y_sin_z * sin_x,
            cos_y_sin_z * cos_x - sin_y_cos_z * sin_x,
            cos_y_cos_z * cos_x - sin_y_sin_z * sin_x,
        )
        .normalize()
    }

    /// Inverse of [`Quat::from_angles`]; returns `(x, y, z)` in radians
    ///
    /// Near the poles (roll of ±90°) pitch is reported as zero and all
    /// heading goes into yaw.
    pub fn to_angles(self) -> Vec3 {
        let sqw = self.w * self.w;
        let sqx = self.x * self.x;
        let sqy = self.y * self.y;
        let sqz = self.z * self.z;
        let unit = sqx + sqy + sqz + sqw;
        let test = self.x * self.y + self.z * self.w;

        if test > 0.499 * unit {
            Vec3::new(0.0, 2.0 * self.x.atan2(self.w), FRAC_PI_2)
        } else if test < -0.499 * unit {
            Vec3::new(0.0, -2.0 * self.x.atan2(self.w), -FRAC_PI_2)
        } else {
            let yaw = (2.0 * self.y * self.w - 2.0 * self.x * self.z).atan2(sqx - sqy - sqz + sqw);
            let roll = (2.0 * test / unit).asin();
            let pitch = (2.0 * self.x * self.w - 2.0 * self.y * self.z).atan2(-sqx + sqy - sqz + sqw);
            Vec3::new(pitch, yaw, roll)
        }
    }

    #[inline]
    pub fn from_rotation_x(angle: f32) -> Self {
        let half = angle * 0.5;
        Self::new(half.sin(), 0.0, 0.0, half.cos())
    }

    #[inline]
    pub fn from_rotation_y(angle: f32) -> Self {
        let half = angle * 0.5;
        Self::new(0.0, half.sin(), 0.0, half.cos())
    }

    #[inline]
    pub fn from_rotation_z(angle: f32) -> Self {
        let half = angle * 0.5;
        Self::new(0.0, 0.0, half.sin(), half.cos())
    }

    /// Create from a rotation matrix
    ///
    /// Columns are normalized first, so a matrix that also carries scale
    /// still yields its pure rotation.
    pub fn from_rotation_matrix(m: &Mat3) -> Self {
        let mut m = *m;
        for col in m.cols.iter_mut() {
            let len_sq = col.length_squared();
            if len_sq != 1.0 && len_sq != 0.0 {
                *col = *col / len_sq.sqrt();
            }
        }

        let (m00, m01, m02) = (m.get(0, 0), m.get(0, 1), m.get(0, 2));
        let (m10, m11, m12) = (m.get(1, 0), m.get(1, 1), m.get(1, 2));
        let (m20, m21, m22) = (m.get(2, 0), m.get(2, 1), m.get(2, 2));

        let trace = m00 + m11 + m22;
        if trace >= 0.0 {
            let s = (trace + 1.0).sqrt();
            let w = 0.5 * s;
            let s = 0.5 / s;
            Self::new((m21 - m12) * s, (m02 - m20) * s, (m10 - m01) * s, w)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt();
            let x = 0.5 * s;
            let s = 0.5 / s;
            Self::new(x, (m10 + m01) * s, (m02 + m20) * s, (m21 - m12) * s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt();
            let y = 0.5 * s;
            let s = 0.5 / s;
            Self::new((m10 + m01) * s, y, (m21 + m12) * s, (m02 - m20) * s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt();
            let z = 0.5 * s;
            let s = 0.5 / s;
            Self::new((m02 + m20) * s, (m21 + m12) * s, z, (m10 - m01) * s)
        }
    }

    /// Rotation whose local axes map onto the given orthonormal basis
    pub fn from_axes(x_axis: Vec3, y_axis: Vec3, z_axis: Vec3) -> Self {
        Self::from_rotation_matrix(&Mat3::from_axes(x_axis, y_axis, z_axis))
    }

    /// The rotated basis axes (columns of the rotation matrix)
    pub fn to_axes(self) -> [Vec3; 3] {
        self.to_mat3().cols
    }

    /// Rotation that points +Z along `direction` with +Y as close to `up`
    /// as possible
    pub fn look_rotation(direction: Vec3, up: Vec3) -> Self {
        let z_axis = direction.normalize();
        let x_axis = up.cross(direction).normalize();
        let y_axis = direction.cross(x_axis).normalize();
        Self::from_axes(x_axis, y_axis, z_axis)
    }

    /// Create quaternion that rotates from one direction to another
    pub fn from_rotation_arc(from: Vec3, to: Vec3) -> Self {
        let from = from.normalize();
        let to = to.normalize();

        let dot = from.dot(to);

        if dot > 0.99999 {
            return Self::IDENTITY;
        }

        if dot < -0.99999 {
            // Opposite vectors: any perpendicular axis works
            let axis = Vec3::X.cross(from);
            let axis = if axis.length_squared() < 1e-6 {
                Vec3::Y.cross(from)
            } else {
                axis
            };
            return Self::from_axis_angle(axis, core::f32::consts::PI);
        }

        let axis = from.cross(to);
        let s = ((1.0 + dot) * 2.0).sqrt();
        let inv_s = 1.0 / s;

        Self::new(axis.x * inv_s, axis.y * inv_s, axis.z * inv_s, s * 0.5)
    }

    /// Squared norm
    #[inline]
    pub fn norm(self) -> f32 {
        self.dot(self)
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.norm().sqrt()
    }

    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
        } else {
            Self::IDENTITY
        }
    }

    #[inline]
    pub fn normalize_local(&mut self) -> &mut Self {
        *self = self.normalize();
        self
    }

    /// Conjugate (inverse for unit quaternions)
    #[inline]
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Inverse; a zero quaternion inverts to identity
    #[inline]
    pub fn inverse(self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            let inv = 1.0 / norm;
            Self::new(-self.x * inv, -self.y * inv, -self.z * inv, self.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    #[inline]
    pub fn negate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }

    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    #[inline]
    pub fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }

    /// Same rotation as `other`: equal up to sign within `tolerance`
    pub fn same_rotation(self, other: Self, tolerance: f32) -> bool {
        (self.dot(other).abs() - 1.0).abs() <= tolerance
    }

    /// Spherical linear interpolation along the shortest arc
    pub fn slerp(self, other: Self, t: f32) -> Self {
        if self == other {
            return self;
        }

        let mut dot = self.dot(other);
        let mut other = other;

        const EPSILON: f32 = 1e-6;
        if dot < -EPSILON {
            other = other.negate();
            dot = -dot;
        }

        dot = dot.clamp(-1.0, 1.0);

        // Nearly identical: fall back to normalized lerp
        if dot > 0.9995 {
            return Self::new(
                self.x + (other.x - self.x) * t,
                self.y + (other.y - self.y) * t,
                self.z + (other.z - self.z) * t,
                self.w + (other.w - self.w) * t,
            )
            .normalize();
        }

        let theta = dot.acos();
        let sin_theta = theta.sin();
        let s1 = ((1.0 - t) * theta).sin() / sin_theta;
        let s2 = (t * theta).sin() / sin_theta;

        Self::new(
            self.x * s1 + other.x * s2,
            self.y * s1 + other.y * s2,
            self.z * s1 + other.z * s2,
            self.w * s1 + other.w * s2,
        )
    }

    /// Normalized linear interpolation along the shortest arc
    pub fn nlerp(self, other: Self, t: f32) -> Self {
        let other = if self.dot(other) < 0.0 { other.negate() } else { other };

        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
            self.w + (other.w - self.w) * t,
        )
        .normalize()
    }

    /// Rotate a vector
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = qv.cross(v);
        let uuv = qv.cross(uv);
        v + (uv * self.w + uuv) * 2.0
    }

    /// Convert to axis-angle representation
    pub fn to_axis_angle(self) -> (Vec3, f32) {
        let q = if self.w < 0.0 { self.negate() } else { self };

        let angle = 2.0 * q.w.clamp(-1.0, 1.0).acos();
        let s = (1.0 - q.w * q.w).max(0.0).sqrt();

        if s < 1e-6 {
            (Vec3::X, angle)
        } else {
            (Vec3::new(q.x / s, q.y / s, q.z / s), angle)
        }
    }

    /// Convert to 3x3 rotation matrix; non-unit quaternions are normalized
    pub fn to_mat3(self) -> Mat3 {
        let norm = self.norm();
        let s = if norm == 1.0 {
            2.0
        } else if norm > 0.0 {
            2.0 / norm
        } else {
            0.0
        };

        let xs = self.x * s;
        let ys = self.y * s;
        let zs = self.z * s;
        let xx = self.x * xs;
        let xy = self.x * ys;
        let xz = self.x * zs;
        let yy = self.y * ys;
        let yz = self.y * zs;
        let zz = self.z * zs;
        let wx = self.w * xs;
        let wy = self.w * ys;
        let wz = self.w * zs;

        Mat3::from_cols(
            Vec3::new(1.0 - (yy + zz), xy + wz, xz - wy),
            Vec3::new(xy - wz, 1.0 - (xx + zz), yz + wx),
            Vec3::new(xz + wy, yz - wx, 1.0 - (xx + yy)),
        )
    }

    #[inline]
    pub fn to_rotation_matrix(self) -> Mat3 {
        self.to_mat3()
    }

    pub fn to_mat4(self) -> Mat4 {
        self.to_mat3().to_mat4()
    }

    #[inline]
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.x, self.y, self.z, self.w)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quat {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

impl MulAssign for Quat {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Mul<Vec3> for Quat {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        self.rotate(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::PI;

    #[test]
    fn test_quaternion_identity() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!((Quat::IDENTITY * v - v).length() < 1e-6);
    }

    #[test]
    fn test_quaternion_rotation_y() {
        let q = Quat::from_rotation_y(PI / 2.0);
        assert!((q * Vec3::X - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_quaternion_slerp() {
        let q1 = Quat::IDENTITY;
        let q2 = Quat::from_rotation_y(PI);
        let mid = q1.slerp(q2, 0.5);
        let expected = Quat::from_rotation_y(PI / 2.0);
        assert!(mid.same_rotation(expected, 1e-3));
    }

    #[test]
    fn test_matrix_round_trip_up_to_sign() {
        let samples = [
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 0.3),
            Quat::from_axis_angle(Vec3::new(0.0, -1.0, 2.0), 2.9),
            Quat::from_axis_angle(Vec3::X, PI),
            Quat::from_axis_angle(Vec3::new(-3.0, 0.5, 0.2), -1.7),
        ];
        for q in samples {
            let back = Quat::from_rotation_matrix(&q.to_rotation_matrix());
            assert!(back.same_rotation(q, 1e-5), "{q:?} -> {back:?}");
        }
    }

    #[test]
    fn test_from_rotation_matrix_ignores_scale() {
        let q = Quat::from_rotation_x(0.7);
        let scaled = Mat4::from_scale_rotation_translation(Vec3::splat(3.0), q, Vec3::ZERO);
        assert!(scaled.to_rotation_quat().same_rotation(q, 1e-5));
    }

    #[test]
    fn test_angles_round_trip() {
        let angles = Vec3::new(0.3, -0.8, 0.5);
        let q = Quat::from_angles(angles.x, angles.y, angles.z);
        let back = q.to_angles();
        assert!((back - angles).length() < 1e-4, "{back:?}");
    }

    #[test]
    fn test_look_rotation_points_z_along_direction() {
        let dir = Vec3::new(1.0, 0.0, 1.0).normalize();
        let q = Quat::look_rotation(dir, Vec3::Y);
        assert!((q * Vec3::Z - dir).length() < 1e-5);
        assert!((q * Vec3::Y - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_axis_angle_round_trip() {
        let q = Quat::from_axis_angle(Vec3::Z, 1.2);
        let (axis, angle) = q.to_axis_angle();
        assert!((axis - Vec3::Z).length() < 1e-5);
        assert!((angle - 1.2).abs() < 1e-5);
    }
}
