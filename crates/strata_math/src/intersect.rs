//! Distance-returning ray intersection tests
//!
//! - AABB (slab method)
//! - Sphere
//! - Triangle (Möller-Trumbore, with barycentric weights)
//! - Plane
//!
//! [`crate::ray::Ray`] carries the boolean/point-returning triangle tests; the
//! functions here return the distance along the ray, which is what collision
//! sorting needs.

use crate::plane::Plane;
use crate::ray::Ray;
use crate::vector::Vec3;

/// Result of a ray-triangle intersection
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    /// Distance along ray to hit point
    pub distance: f32,
    /// Barycentric coordinates [w, u, v] where w = 1 - u - v
    pub barycentric: [f32; 3],
}

/// Ray-AABB intersection using the slab method
///
/// Returns the distance to the entry point, or to the exit point when the
/// origin is inside the box.
pub fn ray_aabb(ray: &Ray, min: Vec3, max: Vec3) -> Option<f32> {
    let inv_dir = ray.inverse_direction();

    let t1 = (min.x - ray.origin.x) * inv_dir.x;
    let t2 = (max.x - ray.origin.x) * inv_dir.x;
    let t3 = (min.y - ray.origin.y) * inv_dir.y;
    let t4 = (max.y - ray.origin.y) * inv_dir.y;
    let t5 = (min.z - ray.origin.z) * inv_dir.z;
    let t6 = (max.z - ray.origin.z) * inv_dir.z;

    let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
    let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

    // tmax < 0: box behind origin; tmin > tmax: miss
    if tmax < 0.0 || tmin > tmax {
        None
    } else {
        Some(if tmin < 0.0 { tmax } else { tmin })
    }
}

/// Ray-sphere intersection
///
/// Returns the nearest positive distance, or None on a miss.
pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let a = ray.direction.dot(ray.direction);
    let b = 2.0 * oc.dot(ray.direction);
    let c = oc.dot(oc) - radius * radius;
    let discriminant = b * b - 4.0 * a * c;

    if discriminant < 0.0 {
        return None;
    }

    let sqrt_d = discriminant.sqrt();
    let t1 = (-b - sqrt_d) / (2.0 * a);
    let t2 = (-b + sqrt_d) / (2.0 * a);

    if t1 > 0.0 {
        Some(t1)
    } else if t2 > 0.0 {
        Some(t2)
    } else {
        None
    }
}

/// Ray-triangle intersection using the Möller-Trumbore algorithm
///
/// # Arguments
/// * `ray` - The ray to test
/// * `v0`, `v1`, `v2` - Triangle vertices
/// * `cull_backface` - If true, only front-facing triangles are hit
pub fn ray_triangle(
    ray: &Ray,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    cull_backface: bool,
) -> Option<TriangleHit> {
    const EPSILON: f32 = 0.0000001;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    if a.abs() < EPSILON {
        return None;
    }

    if cull_backface && a < 0.0 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);

    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);

    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);

    if t > EPSILON && t <= ray.limit {
        Some(TriangleHit {
            distance: t,
            barycentric: [1.0 - u - v, u, v],
        })
    } else {
        None
    }
}

/// Ray-plane intersection; None when parallel or behind the origin
pub fn ray_plane(ray: &Ray, plane: &Plane) -> Option<f32> {
    let denom = plane.normal.dot(ray.direction);
    if denom.abs() < 0.0001 {
        return None;
    }

    let t = (plane.constant - plane.normal.dot(ray.origin)) / denom;
    (t >= 0.0).then_some(t)
}

/// Interpolated unit normal from barycentric weights
pub fn interpolate_normal(n0: Vec3, n1: Vec3, n2: Vec3, bary: [f32; 3]) -> Vec3 {
    (n0 * bary[0] + n1 * bary[1] + n2 * bary[2]).normalize()
}

/// Interpolated UV from barycentric weights
pub fn interpolate_uv(uv0: [f32; 2], uv1: [f32; 2], uv2: [f32; 2], bary: [f32; 3]) -> [f32; 2] {
    [
        uv0[0] * bary[0] + uv1[0] * bary[1] + uv2[0] * bary[2],
        uv0[1] * bary[0] + uv1[1] * bary[1] + uv2[1] * bary[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn wedge() -> [Vec3; 3] {
        [Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)]
    }

    #[test]
    fn test_slab_entry_and_exit() {
        let min = Vec3::new(-1.0, -1.0, 3.0);
        let max = Vec3::new(1.0, 1.0, 8.0);
        let toward = Ray::new(Vec3::new(0.5, 0.0, 0.0), Vec3::Z);
        assert_abs_diff_eq!(ray_aabb(&toward, min, max).unwrap(), 3.0, epsilon = 1e-5);

        let from_inside = Ray::new(Vec3::new(0.0, 0.0, 4.0), Vec3::Z);
        assert_abs_diff_eq!(ray_aabb(&from_inside, min, max).unwrap(), 4.0, epsilon = 1e-5);

        let sideways = Ray::new(Vec3::ZERO, Vec3::Y);
        assert_eq!(ray_aabb(&sideways, min, max), None);

        let past = Ray::new(Vec3::new(0.0, 0.0, 9.0), Vec3::Z);
        assert_eq!(ray_aabb(&past, min, max), None);
    }

    #[test]
    fn test_sphere_nearest_positive_root() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        assert_abs_diff_eq!(ray_sphere(&ray, Vec3::new(0.0, 0.0, 4.0), 2.0).unwrap(), 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(ray_sphere(&ray, Vec3::ZERO, 3.0).unwrap(), 5.0, epsilon = 1e-5);
        assert_eq!(ray_sphere(&ray, Vec3::new(0.0, 6.0, 4.0), 2.0), None);
    }

    #[test]
    fn test_triangle_weights_locate_hit() {
        let [a, b, c] = wedge();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let hit = ray_triangle(&ray, a, b, c, false).unwrap();
        assert_abs_diff_eq!(hit.distance, 5.0, epsilon = 1e-5);

        let point = a * hit.barycentric[0] + b * hit.barycentric[1] + c * hit.barycentric[2];
        assert!(point.approx_eq(Vec3::ZERO));
    }

    #[test]
    fn test_triangle_culling_follows_winding() {
        let [a, b, c] = wedge();
        // counter-clockwise seen from +Z
        let from_front = Ray::new(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z);
        let from_back = Ray::new(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        assert!(ray_triangle(&from_front, a, b, c, true).is_some());
        assert!(ray_triangle(&from_back, a, b, c, true).is_none());
        assert!(ray_triangle(&from_back, a, b, c, false).is_some());
    }

    #[test]
    fn test_triangle_respects_limit() {
        let [a, b, c] = wedge();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -3.0), Vec3::Z).with_limit(2.0);
        assert!(ray_triangle(&ray, a, b, c, false).is_none());
    }

    #[test]
    fn test_plane_hit_and_parallel() {
        let floor = Plane::new(Vec3::Y, -1.0);
        let down = Ray::new(Vec3::new(3.0, 2.0, 0.0), Vec3::NEG_Y);
        assert_abs_diff_eq!(ray_plane(&down, &floor).unwrap(), 3.0, epsilon = 1e-5);

        let level = Ray::new(Vec3::new(3.0, 2.0, 0.0), Vec3::Z);
        assert_eq!(ray_plane(&level, &floor), None);
    }

    #[test]
    fn test_barycentric_blends() {
        let uv = interpolate_uv([0.0, 0.0], [2.0, 0.0], [0.0, 4.0], [0.5, 0.25, 0.25]);
        assert_abs_diff_eq!(uv[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(uv[1], 1.0, epsilon = 1e-6);

        let n = interpolate_normal(Vec3::X, Vec3::Y, Vec3::Y, [0.0, 0.5, 0.5]);
        assert!(n.approx_eq(Vec3::Y));
    }
}
