//! Infinite plane in normal/constant form
//!
//! A point `p` lies on the plane when `normal.dot(p) == constant`.

use crate::consts::FLT_EPSILON;
use crate::vector::Vec3;

/// Which half-space a point or volume occupies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    /// On the plane, or straddling it
    None,
    /// In front of the plane (along the normal)
    Positive,
    /// Behind the plane
    Negative,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    pub normal: Vec3,
    pub constant: f32,
}

impl Plane {
    #[inline]
    pub const fn new(normal: Vec3, constant: f32) -> Self {
        Self { normal, constant }
    }

    /// Plane through `origin` facing `normal`
    pub fn from_origin_normal(origin: Vec3, normal: Vec3) -> Self {
        let mut plane = Self::default();
        plane.set_origin_normal(origin, normal);
        plane
    }

    /// Plane through three points, normal following their winding
    pub fn from_points(v1: Vec3, v2: Vec3, v3: Vec3) -> Self {
        let mut plane = Self::default();
        plane.set_plane_points(v1, v2, v3);
        plane
    }

    pub fn set_origin_normal(&mut self, origin: Vec3, normal: Vec3) {
        self.normal = normal;
        self.constant = normal.dot(origin);
    }

    pub fn set_plane_points(&mut self, v1: Vec3, v2: Vec3, v3: Vec3) {
        self.normal = (v2 - v1).cross(v3 - v1).normalize();
        self.constant = self.normal.dot(v1);
    }

    /// Signed distance scaled by the normal's length
    #[inline]
    pub fn pseudo_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.constant
    }

    pub fn which_side(&self, point: Vec3) -> Side {
        let dis = self.pseudo_distance(point);
        if dis < 0.0 {
            Side::Negative
        } else if dis > 0.0 {
            Side::Positive
        } else {
            Side::None
        }
    }

    #[inline]
    pub fn is_on_plane(&self, point: Vec3) -> bool {
        self.pseudo_distance(point).abs() < FLT_EPSILON
    }

    /// Orthogonal projection of `point` onto the plane
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let t = (self.constant - self.normal.dot(point)) / self.normal.dot(self.normal);
        point + self.normal * t
    }

    /// Mirror image of `point` across the plane
    pub fn reflect(&self, point: Vec3) -> Vec3 {
        let d = self.pseudo_distance(point) / self.normal.dot(self.normal);
        point - self.normal * (2.0 * d)
    }

    /// A point on the plane (the one closest to the origin)
    pub fn origin(&self) -> Vec3 {
        self.closest_point(Vec3::ZERO)
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self::new(Vec3::Y, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_which_side() {
        let plane = Plane::from_origin_normal(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert_eq!(plane.constant, 2.0);
        assert_eq!(plane.which_side(Vec3::new(5.0, 3.0, 1.0)), Side::Positive);
        assert_eq!(plane.which_side(Vec3::new(5.0, 1.0, 1.0)), Side::Negative);
        assert_eq!(plane.which_side(Vec3::new(-4.0, 2.0, 9.0)), Side::None);
        assert!(plane.is_on_plane(Vec3::new(1.0, 2.0, 1.0)));
    }

    #[test]
    fn test_points_follow_winding() {
        let plane = Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert!((plane.normal - Vec3::Z).length() < 1e-6);
        assert_eq!(plane.constant, 0.0);
    }

    #[test]
    fn test_closest_point_and_reflect() {
        let plane = Plane::new(Vec3::Y, 1.0);
        let p = Vec3::new(3.0, 4.0, -2.0);
        assert!((plane.closest_point(p) - Vec3::new(3.0, 1.0, -2.0)).length() < 1e-6);
        assert!((plane.reflect(p) - Vec3::new(3.0, -2.0, -2.0)).length() < 1e-6);
        assert!((plane.origin() - Vec3::Y).length() < 1e-6);
    }
}
