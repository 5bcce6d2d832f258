//! Bounding volumes for culling, picking and scene bounds
//!
//! [`BoundingBox`] is axis aligned and stored as center plus half extents;
//! [`BoundingSphere`] is center plus radius. [`BoundingVolume`] wraps either
//! one. Merging keeps the kind of the receiver: a box merged with a sphere
//! stays a box.

use crate::intersect::{ray_aabb, ray_sphere};
use crate::plane::{Plane, Side};
use crate::ray::Ray;
use crate::transform::Transform;
use crate::vector::Vec3;

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub center: Vec3,
    /// Half extents along each axis
    pub extent: Vec3,
}

impl BoundingBox {
    #[inline]
    pub const fn new(center: Vec3, extent: Vec3) -> Self {
        Self { center, extent }
    }

    /// Create from min and max corners
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let center = (min + max) * 0.5;
        Self::new(center, max - center)
    }

    /// Tightest box around `points`; empty input gives a zero box at the origin
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(&first) = points.first() else {
            return Self::default();
        };
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        Self::from_min_max(min, max)
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.extent
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.extent
    }

    pub fn volume(&self) -> f32 {
        8.0 * self.extent.x * self.extent.y * self.extent.z
    }

    /// Smallest box containing both
    pub fn merge(&self, other: &BoundingBox) -> Self {
        Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }

    /// Smallest box containing `self` and the sphere
    pub fn merge_sphere(&self, sphere: &BoundingSphere) -> Self {
        self.merge(&BoundingBox::new(sphere.center, Vec3::splat(sphere.radius)))
    }

    /// Box around `self` after `transform`
    ///
    /// The center goes through the full transform; the extents are scaled
    /// and pushed through the absolute rotation matrix so the result stays
    /// axis aligned.
    pub fn transform(&self, transform: &Transform) -> Self {
        let rot = transform.rotation.to_mat3();
        let scaled = self.extent.mult(transform.scale.abs());
        let extent = Vec3::new(
            rot.get(0, 0).abs() * scaled.x + rot.get(0, 1).abs() * scaled.y + rot.get(0, 2).abs() * scaled.z,
            rot.get(1, 0).abs() * scaled.x + rot.get(1, 1).abs() * scaled.y + rot.get(1, 2).abs() * scaled.z,
            rot.get(2, 0).abs() * scaled.x + rot.get(2, 1).abs() * scaled.y + rot.get(2, 2).abs() * scaled.z,
        );
        Self::new(transform.transform_vector(self.center), extent)
    }

    /// Point strictly inside the box
    pub fn contains(&self, point: Vec3) -> bool {
        (self.center.x - point.x).abs() < self.extent.x
            && (self.center.y - point.y).abs() < self.extent.y
            && (self.center.z - point.z).abs() < self.extent.z
    }

    /// Point inside or on the surface
    pub fn intersects_point(&self, point: Vec3) -> bool {
        (self.center.x - point.x).abs() <= self.extent.x
            && (self.center.y - point.y).abs() <= self.extent.y
            && (self.center.z - point.z).abs() <= self.extent.z
    }

    pub fn intersects_box(&self, other: &BoundingBox) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        a_min.x <= b_max.x
            && a_max.x >= b_min.x
            && a_min.y <= b_max.y
            && a_max.y >= b_min.y
            && a_min.z <= b_max.z
            && a_max.z >= b_min.z
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.distance_squared_to(sphere.center) <= sphere.radius * sphere.radius
    }

    /// Closest point of the box to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let (min, max) = (self.min(), self.max());
        Vec3::new(
            point.x.clamp(min.x, max.x),
            point.y.clamp(min.y, max.y),
            point.z.clamp(min.z, max.z),
        )
    }

    /// Squared distance from `point` to the box (zero inside)
    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        (point - self.closest_point(point)).length_squared()
    }

    /// Distance from `point` to the box surface when outside, zero inside
    pub fn distance_to_edge(&self, point: Vec3) -> f32 {
        let mut closest = point - self.center;
        let mut sqr_distance = 0.0;
        for axis in 0..3 {
            let ext = self.extent[axis];
            if closest[axis] < -ext {
                let delta = closest[axis] + ext;
                sqr_distance += delta * delta;
                closest[axis] = -ext;
            } else if closest[axis] > ext {
                let delta = closest[axis] - ext;
                sqr_distance += delta * delta;
                closest[axis] = ext;
            }
        }
        f32::sqrt(sqr_distance)
    }

    pub fn which_side(&self, plane: &Plane) -> Side {
        let radius = (self.extent.x * plane.normal.x).abs()
            + (self.extent.y * plane.normal.y).abs()
            + (self.extent.z * plane.normal.z).abs();
        let distance = plane.pseudo_distance(self.center);
        if distance < -radius {
            Side::Negative
        } else if distance > radius {
            Side::Positive
        } else {
            Side::None
        }
    }

    /// The 8 corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

/// Bounding sphere
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    #[inline]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere centered on the average of `points`
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let sum = points.iter().fold(Vec3::ZERO, |acc, &p| acc + p);
        let center = sum / points.len() as f32;
        let radius_sq = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0_f32, f32::max);
        Self::new(center, radius_sq.sqrt())
    }

    pub fn volume(&self) -> f32 {
        (4.0 / 3.0) * core::f32::consts::PI * self.radius * self.radius * self.radius
    }

    /// Smallest sphere containing both
    pub fn merge(&self, other: &BoundingSphere) -> Self {
        let diff = other.center - self.center;
        let length_sq = diff.length_squared();
        let radius_diff = other.radius - self.radius;

        if radius_diff * radius_diff >= length_sq {
            // one already contains the other
            return if radius_diff <= 0.0 { *self } else { *other };
        }

        let length = length_sq.sqrt();
        let center = if length > crate::consts::ZERO_TOLERANCE {
            let coeff = (length + radius_diff) / (2.0 * length);
            self.center + diff * coeff
        } else {
            self.center
        };
        Self::new(center, 0.5 * (length + self.radius + other.radius))
    }

    /// Smallest sphere containing `self` and the box's enclosing sphere
    pub fn merge_box(&self, bbox: &BoundingBox) -> Self {
        self.merge(&BoundingSphere::new(bbox.center, bbox.extent.length()))
    }

    /// Sphere around `self` after `transform`; the radius grows with the
    /// largest scale axis
    pub fn transform(&self, transform: &Transform) -> Self {
        Self::new(
            transform.transform_vector(self.center),
            (self.radius * transform.scale.abs().max_component()).abs(),
        )
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) - self.radius * self.radius <= 0.0
    }

    pub fn intersects_sphere(&self, other: &BoundingSphere) -> bool {
        let r = self.radius + other.radius;
        self.center.distance_squared(other.center) <= r * r
    }

    pub fn distance_to_edge(&self, point: Vec3) -> f32 {
        self.center.distance(point) - self.radius
    }

    pub fn which_side(&self, plane: &Plane) -> Side {
        let distance = plane.pseudo_distance(self.center);
        if distance <= -self.radius {
            Side::Negative
        } else if distance >= self.radius {
            Side::Positive
        } else {
            Side::None
        }
    }

    /// Cheap ray test: true when the ray starts inside or points at the sphere
    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        let diff = ray.origin - self.center;
        let a = diff.dot(diff) - self.radius * self.radius;
        if a <= 0.0 {
            return true;
        }
        let b = ray.direction.dot(diff);
        if b >= 0.0 {
            return false;
        }
        b * b >= a
    }
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0)
    }
}

/// Either kind of bounding volume
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundingVolume {
    Box(BoundingBox),
    Sphere(BoundingSphere),
}

impl BoundingVolume {
    pub fn center(&self) -> Vec3 {
        match self {
            BoundingVolume::Box(b) => b.center,
            BoundingVolume::Sphere(s) => s.center,
        }
    }

    pub fn set_center(&mut self, center: Vec3) {
        match self {
            BoundingVolume::Box(b) => b.center = center,
            BoundingVolume::Sphere(s) => s.center = center,
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            BoundingVolume::Box(b) => b.volume(),
            BoundingVolume::Sphere(s) => s.volume(),
        }
    }

    /// Merge `other` into a volume of the same kind as `self`
    pub fn merge(&self, other: &BoundingVolume) -> Self {
        match (self, other) {
            (BoundingVolume::Box(a), BoundingVolume::Box(b)) => BoundingVolume::Box(a.merge(b)),
            (BoundingVolume::Box(a), BoundingVolume::Sphere(s)) => {
                BoundingVolume::Box(a.merge_sphere(s))
            }
            (BoundingVolume::Sphere(a), BoundingVolume::Sphere(b)) => {
                BoundingVolume::Sphere(a.merge(b))
            }
            (BoundingVolume::Sphere(a), BoundingVolume::Box(b)) => {
                BoundingVolume::Sphere(a.merge_box(b))
            }
        }
    }

    pub fn merge_local(&mut self, other: &BoundingVolume) -> &mut Self {
        *self = self.merge(other);
        self
    }

    pub fn transform(&self, transform: &Transform) -> Self {
        match self {
            BoundingVolume::Box(b) => BoundingVolume::Box(b.transform(transform)),
            BoundingVolume::Sphere(s) => BoundingVolume::Sphere(s.transform(transform)),
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        match self {
            BoundingVolume::Box(b) => b.contains(point),
            BoundingVolume::Sphere(s) => s.contains(point),
        }
    }

    pub fn intersects(&self, other: &BoundingVolume) -> bool {
        match (self, other) {
            (BoundingVolume::Box(a), BoundingVolume::Box(b)) => a.intersects_box(b),
            (BoundingVolume::Box(a), BoundingVolume::Sphere(s))
            | (BoundingVolume::Sphere(s), BoundingVolume::Box(a)) => a.intersects_sphere(s),
            (BoundingVolume::Sphere(a), BoundingVolume::Sphere(b)) => a.intersects_sphere(b),
        }
    }

    /// Distance along `ray` to the volume, if hit within the ray's limit;
    /// zero-ish distances mean the origin is inside
    pub fn ray_distance(&self, ray: &Ray) -> Option<f32> {
        let t = match self {
            BoundingVolume::Box(b) => ray_aabb(ray, b.min(), b.max()),
            BoundingVolume::Sphere(s) => {
                if s.contains(ray.origin) {
                    Some(0.0)
                } else {
                    ray_sphere(ray, s.center, s.radius)
                }
            }
        }?;
        (t <= ray.limit).then_some(t)
    }

    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        match self {
            BoundingVolume::Sphere(s) if ray.limit.is_infinite() => s.intersects_ray(ray),
            _ => self.ray_distance(ray).is_some(),
        }
    }

    pub fn which_side(&self, plane: &Plane) -> Side {
        match self {
            BoundingVolume::Box(b) => b.which_side(plane),
            BoundingVolume::Sphere(s) => s.which_side(plane),
        }
    }

    pub fn distance_to_edge(&self, point: Vec3) -> f32 {
        match self {
            BoundingVolume::Box(b) => b.distance_to_edge(point),
            BoundingVolume::Sphere(s) => s.distance_to_edge(point),
        }
    }

    pub fn distance_to_center(&self, point: Vec3) -> f32 {
        self.center().distance(point)
    }

    /// Axis-aligned box enclosing this volume
    pub fn to_box(&self) -> BoundingBox {
        match self {
            BoundingVolume::Box(b) => *b,
            BoundingVolume::Sphere(s) => BoundingBox::new(s.center, Vec3::splat(s.radius)),
        }
    }
}

impl Default for BoundingVolume {
    fn default() -> Self {
        BoundingVolume::Box(BoundingBox::default())
    }
}

impl From<BoundingBox> for BoundingVolume {
    fn from(b: BoundingBox) -> Self {
        BoundingVolume::Box(b)
    }
}

impl From<BoundingSphere> for BoundingVolume {
    fn from(s: BoundingSphere) -> Self {
        BoundingVolume::Sphere(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quaternion::Quat;

    #[test]
    fn test_box_contains_point() {
        let bbox = BoundingBox::from_min_max(Vec3::ZERO, Vec3::ONE);
        assert!(bbox.contains(Vec3::splat(0.5)));
        assert!(!bbox.contains(Vec3::new(1.5, 0.5, 0.5)));
        // surface counts for intersects_point but not contains
        assert!(!bbox.contains(Vec3::new(1.0, 0.5, 0.5)));
        assert!(bbox.intersects_point(Vec3::new(1.0, 0.5, 0.5)));
    }

    #[test]
    fn test_box_merge_spans_both() {
        let a = BoundingBox::new(Vec3::new(-2.0, 0.0, 0.0), Vec3::ONE);
        let b = BoundingBox::new(Vec3::new(2.0, 0.0, 0.0), Vec3::ONE);
        let m = a.merge(&b);
        assert_eq!(m.min(), Vec3::new(-3.0, -1.0, -1.0));
        assert_eq!(m.max(), Vec3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn test_sphere_merge_spans_both() {
        let a = BoundingSphere::new(Vec3::new(-2.0, 0.0, 0.0), 1.0);
        let b = BoundingSphere::new(Vec3::new(2.0, 0.0, 0.0), 1.0);
        let m = a.merge(&b);
        assert!(m.center.length() < 1e-6);
        assert!((m.radius - 3.0).abs() < 1e-6);

        let inner = BoundingSphere::new(Vec3::new(0.5, 0.0, 0.0), 0.25);
        assert_eq!(m.merge(&inner), m);
    }

    #[test]
    fn test_box_transform_rotates_extents() {
        let bbox = BoundingBox::new(Vec3::X, Vec3::new(2.0, 1.0, 0.5));
        let t = Transform::new(
            Vec3::new(0.0, 0.0, 10.0),
            Quat::from_rotation_z(core::f32::consts::FRAC_PI_2),
            Vec3::splat(2.0),
        );
        let moved = bbox.transform(&t);
        assert!((moved.center - Vec3::new(0.0, 2.0, 10.0)).length() < 1e-5);
        assert!((moved.extent - Vec3::new(2.0, 4.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_which_side() {
        let plane = Plane::new(Vec3::X, 0.0);
        let bbox = BoundingBox::new(Vec3::new(3.0, 0.0, 0.0), Vec3::ONE);
        assert_eq!(bbox.which_side(&plane), Side::Positive);
        let sphere = BoundingSphere::new(Vec3::new(-3.0, 0.0, 0.0), 1.0);
        assert_eq!(sphere.which_side(&plane), Side::Negative);
        let straddle = BoundingSphere::new(Vec3::new(0.5, 0.0, 0.0), 1.0);
        assert_eq!(straddle.which_side(&plane), Side::None);
    }

    #[test]
    fn test_distance_to_edge() {
        let bbox = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(bbox.distance_to_edge(Vec3::new(4.0, 0.0, 0.0)), 3.0);
        assert_eq!(bbox.distance_to_edge(Vec3::splat(0.5)), 0.0);
        let sphere = BoundingSphere::new(Vec3::ZERO, 2.0);
        assert_eq!(sphere.distance_to_edge(Vec3::new(5.0, 0.0, 0.0)), 3.0);
    }

    #[test]
    fn test_volume_ray_hits() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -10.0), Vec3::Z);
        let bbox = BoundingVolume::Box(BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        assert!((bbox.ray_distance(&ray).unwrap() - 9.0).abs() < 1e-5);
        let sphere = BoundingVolume::Sphere(BoundingSphere::new(Vec3::new(0.0, 5.0, 0.0), 1.0));
        assert!(!sphere.intersects_ray(&ray));
        assert!(bbox.ray_distance(&ray.with_limit(5.0)).is_none());
    }

    #[test]
    fn test_merge_keeps_receiver_kind() {
        let b = BoundingVolume::from(BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        let s = BoundingVolume::from(BoundingSphere::new(Vec3::new(4.0, 0.0, 0.0), 1.0));
        assert!(matches!(b.merge(&s), BoundingVolume::Box(_)));
        assert!(matches!(s.merge(&b), BoundingVolume::Sphere(_)));
        assert!(b.merge(&s).intersects(&s));
    }
}
