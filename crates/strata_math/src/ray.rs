//! 3D ray for picking and collision
//!
//! The triangle tests share one routine with two switches: `planar` returns
//! `(t, w1, w2)` (distance plus barycentric weights of the second and third
//! vertex) instead of the world point, and `quad` treats the three points as
//! corners of a parallelogram. The two shapes use different boundary
//! comparisons on purpose; see [`Ray::intersect_where_quad`].

use crate::consts::FLT_EPSILON;
use crate::matrix::Mat4;
use crate::plane::Plane;
use crate::triangle::Triangle;
use crate::vector::Vec3;

/// 3D ray with an optional length limit
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ray {
    /// Ray origin point
    pub origin: Vec3,
    /// Ray direction (normalized by the constructors)
    pub direction: Vec3,
    /// Collisions farther than this are ignored
    pub limit: f32,
}

impl Ray {
    /// Create a new unlimited ray with normalized direction
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
            limit: f32::INFINITY,
        }
    }

    /// Create a ray from two points
    #[inline]
    pub fn from_points(start: Vec3, end: Vec3) -> Self {
        Self::new(start, end - start)
    }

    #[inline]
    pub fn with_limit(mut self, limit: f32) -> Self {
        self.limit = limit;
        self
    }

    /// Get a point at distance t along the ray
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Get the closest point on the ray to a given point
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let t = (point - self.origin).dot(self.direction);
        if t > 0.0 {
            self.at(t)
        } else {
            self.origin
        }
    }

    pub fn distance_squared(&self, point: Vec3) -> f32 {
        (point - self.closest_point(point)).length_squared()
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.distance_squared(point).sqrt()
    }

    /// Transform the ray by a matrix
    ///
    /// The origin is transformed as a point, the direction as a vector.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let origin = matrix.transform_point(self.origin);
        let direction = matrix.transform_vector(self.direction);
        Self::new(origin, direction).with_limit(self.limit)
    }

    /// Inverse direction (1.0 / component), for slab tests
    #[inline]
    pub fn inverse_direction(&self) -> Vec3 {
        Vec3::new(
            1.0 / self.direction.x,
            1.0 / self.direction.y,
            1.0 / self.direction.z,
        )
    }

    /// Check if the ray direction is valid (non-zero length)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.direction.length_squared() > 1e-10
    }

    /// Shared triangle/quad test
    ///
    /// Returns `None` on a miss. On a hit returns the world point, or
    /// `(t, w1, w2)` packed in a `Vec3` when `planar` is set.
    fn intersects(&self, v0: Vec3, v1: Vec3, v2: Vec3, planar: bool, quad: bool) -> Option<Vec3> {
        let diff = self.origin - v0;
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;
        let norm = edge1.cross(edge2);

        let mut dir_dot_norm = self.direction.dot(norm);
        let sign = if dir_dot_norm > FLT_EPSILON {
            1.0
        } else if dir_dot_norm < -FLT_EPSILON {
            dir_dot_norm = -dir_dot_norm;
            -1.0
        } else {
            // parallel to the triangle plane
            return None;
        };

        let dir_dot_diff_x_edge2 = sign * self.direction.dot(diff.cross(edge2));
        if dir_dot_diff_x_edge2 < 0.0 {
            return None;
        }

        let dir_dot_edge1_x_diff = sign * self.direction.dot(edge1.cross(diff));
        if dir_dot_edge1_x_diff < 0.0 {
            return None;
        }

        let inside = if quad {
            dir_dot_edge1_x_diff <= dir_dot_norm
        } else {
            dir_dot_diff_x_edge2 + dir_dot_edge1_x_diff <= dir_dot_norm
        };
        if !inside {
            return None;
        }

        let diff_dot_norm = -sign * diff.dot(norm);
        if diff_dot_norm < 0.0 {
            return None;
        }

        let inv = 1.0 / dir_dot_norm;
        let t = diff_dot_norm * inv;
        if planar {
            Some(Vec3::new(t, dir_dot_diff_x_edge2 * inv, dir_dot_edge1_x_diff * inv))
        } else {
            Some(self.at(t))
        }
    }

    /// True when the ray hits the triangle
    pub fn intersects_triangle(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> bool {
        self.intersects(v0, v1, v2, false, false).is_some()
    }

    /// World-space hit point on the triangle
    pub fn intersect_where(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<Vec3> {
        self.intersects(v0, v1, v2, false, false)
    }

    pub fn intersect_where_triangle(&self, tri: &Triangle) -> Option<Vec3> {
        self.intersect_where(tri.get(0), tri.get(1), tri.get(2))
    }

    /// Hit as `(t, w1, w2)`; the hit point is `v0 * (1 - w1 - w2) + v1 * w1 + v2 * w2`
    pub fn intersect_where_planar(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<Vec3> {
        self.intersects(v0, v1, v2, true, false)
    }

    /// Hit on the parallelogram spanned by `v0`, `v1` and `v2`
    ///
    /// Only the `v0→v2` weight is bounded above; the `v0→v1` weight has no
    /// upper bound check, so hits past the far edge along `v1 - v0` are
    /// reported.
    pub fn intersect_where_quad(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<Vec3> {
        self.intersects(v0, v1, v2, false, true)
    }

    /// [`Ray::intersect_where_quad`] returning `(t, w1, w2)`
    pub fn intersect_where_planar_quad(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<Vec3> {
        self.intersects(v0, v1, v2, true, true)
    }

    /// Distance to the triangle, if hit within `limit`
    pub fn collide_with_triangle(&self, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
        let hit = self.intersect_where_planar(v0, v1, v2)?;
        (hit.x <= self.limit).then_some(hit.x)
    }

    /// Hit point on the plane, in front of the origin
    pub fn intersects_where_plane(&self, plane: &Plane) -> Option<Vec3> {
        let denominator = plane.normal.dot(self.direction);
        if denominator > -FLT_EPSILON && denominator < FLT_EPSILON {
            return None;
        }

        let numerator = -(plane.normal.dot(self.origin) - plane.constant);
        let ratio = numerator / denominator;
        if ratio < FLT_EPSILON {
            return None;
        }
        Some(self.at(ratio))
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Z)
    }
}
