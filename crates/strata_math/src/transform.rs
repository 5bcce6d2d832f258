//! Translation / rotation / scale transform used by every spatial

use crate::matrix::Mat4;
use crate::quaternion::Quat;
use crate::vector::Vec3;

/// Complete 3D transform
///
/// A point is scaled first, then rotated, then translated.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub const fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { translation, rotation, scale }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Set translation (builder pattern)
    #[inline]
    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    /// Set rotation (builder pattern)
    #[inline]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set scale (builder pattern)
    #[inline]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn with_uniform_scale(self, scale: f32) -> Self {
        self.with_scale(Vec3::splat(scale))
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    #[inline]
    pub fn load_identity(&mut self) {
        *self = Self::IDENTITY;
    }

    /// Express `self` (given in the parent's space) in the space the parent
    /// lives in
    pub fn combine_with_parent(&self, parent: &Transform) -> Self {
        Self {
            scale: self.scale.mult(parent.scale),
            rotation: parent.rotation * self.rotation,
            translation: parent.rotation * self.translation.mult(parent.scale) + parent.translation,
        }
    }

    /// Convert to a 4x4 transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Decompose an affine matrix without shear
    pub fn from_matrix(m: &Mat4) -> Self {
        Self {
            translation: m.translation(),
            rotation: m.to_rotation_quat(),
            scale: m.scale_part(),
        }
    }

    /// Transform a point from local into parent space
    #[inline]
    pub fn transform_vector(&self, point: Vec3) -> Vec3 {
        self.rotation * point.mult(self.scale) + self.translation
    }

    /// Inverse of [`Transform::transform_vector`]
    #[inline]
    pub fn transform_inverse_vector(&self, point: Vec3) -> Vec3 {
        (self.rotation.inverse() * (point - self.translation)).divide(self.scale)
    }

    /// Transform a direction (ignores translation and scale)
    #[inline]
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Inverse transform; exact for uniform scale
    pub fn invert(&self) -> Self {
        Self::from_matrix(&self.to_matrix().invert())
    }

    /// Interpolate between two transforms
    pub fn interpolate(&self, other: &Transform, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// `parent * child` yields the child expressed in the parent's parent space
impl core::ops::Mul for Transform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        rhs.combine_with_parent(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    #[test]
    fn test_transform_identity() {
        let point = Vec3::new(1.0, 2.0, 3.0);
        assert!((Transform::IDENTITY.transform_vector(point) - point).length() < 1e-6);
    }

    #[test]
    fn test_combine_with_parent_order() {
        let parent = Transform::new(
            Vec3::new(10.0, 0.0, 0.0),
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::splat(2.0),
        );
        let child = Transform::from_translation(Vec3::X);
        let world = child.combine_with_parent(&parent);

        // child offset scaled by 2 then rotated onto +Y
        assert!((world.translation - Vec3::new(10.0, 2.0, 0.0)).length() < 1e-5);
        assert_eq!(world.scale, Vec3::splat(2.0));

        let p = Vec3::new(0.5, 0.0, 0.0);
        let via_chain = parent.transform_vector(child.transform_vector(p));
        assert!((world.transform_vector(p) - via_chain).length() < 1e-5);
    }

    #[test]
    fn test_matrix_matches_transform_vector() {
        let t = Transform::new(
            Vec3::new(1.0, -2.0, 3.0),
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 1.0), 0.6),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let p = Vec3::new(0.3, 0.7, -1.1);
        assert!((t.to_matrix().transform_point(p) - t.transform_vector(p)).length() < 1e-5);
        assert!((t.transform_inverse_vector(t.transform_vector(p)) - p).length() < 1e-5);
    }

    #[test]
    fn test_invert_uniform_scale() {
        let t = Transform::new(
            Vec3::new(4.0, 0.0, -1.0),
            Quat::from_rotation_y(0.9),
            Vec3::splat(0.5),
        );
        let p = Vec3::new(1.0, 2.0, 3.0);
        let back = t.invert().transform_vector(t.transform_vector(p));
        assert!((back - p).length() < 1e-4);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_json() {
        let t = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)).with_uniform_scale(2.0);
        let json = serde_json::to_string(&t).unwrap();
        let back: Transform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
