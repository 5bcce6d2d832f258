//! Matrix types for transformations
//!
//! Column-major storage, column-vector convention: `m * v` applies `m` to `v`
//! and `a * b` applies `b` first. Inversion is closed-form cofactor expansion;
//! a matrix whose determinant magnitude is at or below [`FLT_EPSILON`] inverts
//! to [`Mat3::ZERO`] / [`Mat4::ZERO`], and [`Mat4::try_invert`] reports the same
//! case as `None`.

use core::ops::{Mul, MulAssign};

use crate::consts::FLT_EPSILON;
use crate::quaternion::Quat;
use crate::vector::{Vec3, Vec4};

/// 3x3 matrix (column-major)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Mat3 {
    pub cols: [Vec3; 3],
}

impl Mat3 {
    pub const IDENTITY: Self = Self {
        cols: [Vec3::X, Vec3::Y, Vec3::Z],
    };

    pub const ZERO: Self = Self {
        cols: [Vec3::ZERO, Vec3::ZERO, Vec3::ZERO],
    };

    #[inline]
    pub const fn from_cols(c0: Vec3, c1: Vec3, c2: Vec3) -> Self {
        Self { cols: [c0, c1, c2] }
    }

    /// Build from three basis axes, each becoming a column
    #[inline]
    pub const fn from_axes(x: Vec3, y: Vec3, z: Vec3) -> Self {
        Self::from_cols(x, y, z)
    }

    #[inline]
    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_cols(
            Vec3::new(scale.x, 0.0, 0.0),
            Vec3::new(0.0, scale.y, 0.0),
            Vec3::new(0.0, 0.0, scale.z),
        )
    }

    /// Rotation of `angle` radians about a unit `axis`
    pub fn from_angle_normal_axis(angle: f32, axis: Vec3) -> Self {
        let (sin, cos) = angle.sin_cos();
        let t = 1.0 - cos;
        let (x, y, z) = (axis.x, axis.y, axis.z);
        Self::from_cols(
            Vec3::new(t * x * x + cos, t * x * y + sin * z, t * x * z - sin * y),
            Vec3::new(t * x * y - sin * z, t * y * y + cos, t * y * z + sin * x),
            Vec3::new(t * x * z + sin * y, t * y * z - sin * x, t * z * z + cos),
        )
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cols[col][row]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.cols[col][row] = value;
    }

    #[inline]
    pub fn row(&self, row: usize) -> Vec3 {
        Vec3::new(self.cols[0][row], self.cols[1][row], self.cols[2][row])
    }

    #[inline]
    pub fn transpose(&self) -> Self {
        Self::from_cols(self.row(0), self.row(1), self.row(2))
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.cols[0].dot(self.cols[1].cross(self.cols[2]))
    }

    /// Transposed cofactor matrix: `adjoint * m == det * I`
    pub fn adjoint(&self) -> Self {
        let [a, b, c] = self.cols;
        Self::from_cols(b.cross(c), c.cross(a), a.cross(b)).transpose()
    }

    /// Inverse, or [`Mat3::ZERO`] when singular
    pub fn invert(&self) -> Self {
        self.try_invert().unwrap_or(Self::ZERO)
    }

    pub fn try_invert(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() <= FLT_EPSILON {
            return None;
        }
        Some(self.adjoint() * (1.0 / det))
    }

    pub fn invert_local(&mut self) -> &mut Self {
        *self = self.invert();
        self
    }

    /// Scale each column by the matching component
    pub fn scale_local(&mut self, scale: Vec3) -> &mut Self {
        self.cols[0] *= scale.x;
        self.cols[1] *= scale.y;
        self.cols[2] *= scale.z;
        self
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            self.cols[0].extend(0.0),
            self.cols[1].extend(0.0),
            self.cols[2].extend(0.0),
            Vec4::W,
        )
    }

    pub fn to_rotation_quat(&self) -> Quat {
        Quat::from_rotation_matrix(self)
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, rhs: Vec3) -> Vec3 {
        self.cols[0] * rhs.x + self.cols[1] * rhs.y + self.cols[2] * rhs.z
    }
}

impl Mul for Mat3 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(self * rhs.cols[0], self * rhs.cols[1], self * rhs.cols[2])
    }
}

impl Mul<f32> for Mat3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::from_cols(self.cols[0] * rhs, self.cols[1] * rhs, self.cols[2] * rhs)
    }
}

/// 4x4 matrix (column-major) - the main transformation matrix
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Mat4 {
    pub cols: [Vec4; 4],
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        cols: [Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
    };

    pub const ZERO: Self = Self {
        cols: [Vec4::ZERO, Vec4::ZERO, Vec4::ZERO, Vec4::ZERO],
    };

    #[inline]
    pub const fn from_cols(c0: Vec4, c1: Vec4, c2: Vec4, c3: Vec4) -> Self {
        Self { cols: [c0, c1, c2, c3] }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_cols(Vec4::X, Vec4::Y, Vec4::Z, translation.extend(1.0))
    }

    #[inline]
    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_cols(
            Vec4::new(scale.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, scale.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, scale.z, 0.0),
            Vec4::W,
        )
    }

    /// Rotation matrix from a quaternion
    pub fn from_quat(q: Quat) -> Self {
        q.to_mat3().to_mat4()
    }

    /// `translation * rotation * scale`
    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        let mut rot = rotation.to_mat3();
        rot.scale_local(scale);
        let mut m = rot.to_mat4();
        m.cols[3] = translation.extend(1.0);
        m
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        let c = self.cols[col];
        match row {
            0 => c.x,
            1 => c.y,
            2 => c.z,
            3 => c.w,
            _ => panic!("Mat4 row out of range: {row}"),
        }
    }

    #[inline]
    pub fn transpose(&self) -> Self {
        Self::from_cols(
            Vec4::new(self.cols[0].x, self.cols[1].x, self.cols[2].x, self.cols[3].x),
            Vec4::new(self.cols[0].y, self.cols[1].y, self.cols[2].y, self.cols[3].y),
            Vec4::new(self.cols[0].z, self.cols[1].z, self.cols[2].z, self.cols[3].z),
            Vec4::new(self.cols[0].w, self.cols[1].w, self.cols[2].w, self.cols[3].w),
        )
    }

    /// Get the translation component
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.cols[3].truncate()
    }

    #[inline]
    pub fn set_translation(&mut self, translation: Vec3) {
        self.cols[3] = translation.extend(self.cols[3].w);
    }

    /// Upper-left 3x3 (rotation and scale)
    pub fn to_mat3(&self) -> Mat3 {
        Mat3::from_cols(
            self.cols[0].truncate(),
            self.cols[1].truncate(),
            self.cols[2].truncate(),
        )
    }

    /// Rotation part as a quaternion; column scale is removed first
    pub fn to_rotation_quat(&self) -> Quat {
        Quat::from_rotation_matrix(&self.to_mat3())
    }

    /// Per-axis scale stored in the upper 3x3
    pub fn scale_part(&self) -> Vec3 {
        Vec3::new(
            self.cols[0].truncate().length(),
            self.cols[1].truncate().length(),
            self.cols[2].truncate().length(),
        )
    }

    /// Transform a point (w = 1); affine matrices only
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        (*self * point.extend(1.0)).truncate()
    }

    /// Transform a point and divide by the resulting w
    #[inline]
    pub fn project_point(&self, point: Vec3) -> Vec3 {
        let v = *self * point.extend(1.0);
        v.truncate() / v.w
    }

    /// Transform a direction (w = 0); the translation column is ignored
    #[inline]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        (*self * vector.extend(0.0)).truncate()
    }

    /// Shared cofactor pass: (adjugate, determinant)
    fn cofactors(&self) -> (Self, f32) {
        let a = self.cols[0];
        let b = self.cols[1];
        let c = self.cols[2];
        let d = self.cols[3];

        let s0 = a.x * b.y - b.x * a.y;
        let s1 = a.x * b.z - b.x * a.z;
        let s2 = a.x * b.w - b.x * a.w;
        let s3 = a.y * b.z - b.y * a.z;
        let s4 = a.y * b.w - b.y * a.w;
        let s5 = a.z * b.w - b.z * a.w;

        let c5 = c.z * d.w - d.z * c.w;
        let c4 = c.y * d.w - d.y * c.w;
        let c3 = c.y * d.z - d.y * c.z;
        let c2 = c.x * d.w - d.x * c.w;
        let c1 = c.x * d.z - d.x * c.z;
        let c0 = c.x * d.y - d.x * c.y;

        let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;

        let adj = Self::from_cols(
            Vec4::new(
                b.y * c5 - b.z * c4 + b.w * c3,
                -a.y * c5 + a.z * c4 - a.w * c3,
                d.y * s5 - d.z * s4 + d.w * s3,
                -c.y * s5 + c.z * s4 - c.w * s3,
            ),
            Vec4::new(
                -b.x * c5 + b.z * c2 - b.w * c1,
                a.x * c5 - a.z * c2 + a.w * c1,
                -d.x * s5 + d.z * s2 - d.w * s1,
                c.x * s5 - c.z * s2 + c.w * s1,
            ),
            Vec4::new(
                b.x * c4 - b.y * c2 + b.w * c0,
                -a.x * c4 + a.y * c2 - a.w * c0,
                d.x * s4 - d.y * s2 + d.w * s0,
                -c.x * s4 + c.y * s2 - c.w * s0,
            ),
            Vec4::new(
                -b.x * c3 + b.y * c1 - b.z * c0,
                a.x * c3 - a.y * c1 + a.z * c0,
                -d.x * s3 + d.y * s1 - d.z * s0,
                c.x * s3 - c.y * s1 + c.z * s0,
            ),
        );
        (adj, det)
    }

    pub fn determinant(&self) -> f32 {
        self.cofactors().1
    }

    /// Transposed cofactor matrix: `adjoint * m == det * I`
    pub fn adjoint(&self) -> Self {
        self.cofactors().0
    }

    /// Inverse, or [`Mat4::ZERO`] when singular
    pub fn invert(&self) -> Self {
        self.try_invert().unwrap_or(Self::ZERO)
    }

    pub fn try_invert(&self) -> Option<Self> {
        let (adj, det) = self.cofactors();
        if det.abs() <= FLT_EPSILON {
            return None;
        }
        Some(adj * (1.0 / det))
    }

    pub fn invert_local(&mut self) -> &mut Self {
        *self = self.invert();
        self
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Convert to flat array (column-major)
    pub fn to_array(&self) -> [f32; 16] {
        [
            self.cols[0].x, self.cols[0].y, self.cols[0].z, self.cols[0].w,
            self.cols[1].x, self.cols[1].y, self.cols[1].z, self.cols[1].w,
            self.cols[2].x, self.cols[2].y, self.cols[2].z, self.cols[2].w,
            self.cols[3].x, self.cols[3].y, self.cols[3].z, self.cols[3].w,
        ]
    }

    /// Inverse of [`Mat4::to_array`]
    pub fn from_array(a: &[f32; 16]) -> Self {
        Self::from_cols(
            Vec4::new(a[0], a[1], a[2], a[3]),
            Vec4::new(a[4], a[5], a[6], a[7]),
            Vec4::new(a[8], a[9], a[10], a[11]),
            Vec4::new(a[12], a[13], a[14], a[15]),
        )
    }

    /// Element-wise comparison within `tolerance`
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Mat4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_cols(
            self * rhs.cols[0],
            self * rhs.cols[1],
            self * rhs.cols[2],
            self * rhs.cols[3],
        )
    }
}

impl Mul<Vec4> for Mat4 {
    type Output = Vec4;

    #[inline]
    fn mul(self, rhs: Vec4) -> Vec4 {
        self.cols[0] * rhs.x + self.cols[1] * rhs.y + self.cols[2] * rhs.z + self.cols[3] * rhs.w
    }
}

impl Mul<f32> for Mat4 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::from_cols(
            self.cols[0] * rhs,
            self.cols[1] * rhs,
            self.cols[2] * rhs,
            self.cols[3] * rhs,
        )
    }
}

impl MulAssign for Mat4 {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mat4() -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 0.5, 1.5),
            Quat::from_axis_angle(Vec3::new(1.0, 2.0, -0.5), 0.8),
            Vec3::new(3.0, -1.0, 7.0),
        )
    }

    #[test]
    fn test_mat4_identity() {
        let v = Vec4::new(1.0, 2.0, 3.0, 1.0);
        assert_eq!(Mat4::IDENTITY * v, v);
    }

    #[test]
    fn test_mat4_translation() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let result = m.transform_point(Vec3::ZERO);
        assert!((result - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
        assert_eq!(m.transform_vector(Vec3::X), Vec3::X);
    }

    #[test]
    fn test_mat4_inverse_times_self_is_identity() {
        let m = sample_mat4();
        assert!(m.determinant().abs() > FLT_EPSILON);
        assert!((m.invert() * m).approx_eq(&Mat4::IDENTITY, 1e-5));
        assert!((m * m.invert()).approx_eq(&Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_mat4_singular_inverts_to_zero() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(m.invert(), Mat4::ZERO);
        assert!(m.try_invert().is_none());
    }

    #[test]
    fn test_mat4_adjoint_is_det_times_inverse() {
        let m = sample_mat4();
        let scaled = m.adjoint() * m;
        let det = m.determinant();
        assert!(scaled.approx_eq(&(Mat4::IDENTITY * det), 1e-4));
    }

    #[test]
    fn test_mat3_inverse_times_self_is_identity() {
        let m = Mat3::from_cols(
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(-1.0, 3.0, 0.5),
            Vec3::new(0.0, 0.25, 4.0),
        );
        let id = m.invert() * m;
        for col in 0..3 {
            for row in 0..3 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!((id.get(row, col) - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_mat3_singular_inverts_to_zero() {
        let m = Mat3::from_cols(Vec3::X, Vec3::X, Vec3::Z);
        assert_eq!(m.invert(), Mat3::ZERO);
    }

    #[test]
    fn test_scale_rotation_translation_order() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_z(core::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 0.0, 0.0),
        );
        // scale, then rotate X onto Y, then translate
        let p = m.transform_point(Vec3::X);
        assert!((p - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
    }
}
