//! # strata_math - Math Library
//!
//! Value types and geometric routines for the Strata scene graph:
//! vectors, matrices, quaternions and transforms; planes, rays, triangles
//! and line segments; bounding volumes; intersection tests; symmetric
//! eigen-decomposition; splines and NURBS curves.
//!
//! Numerically degenerate inputs never panic. Near-singular matrices invert
//! to zero, zero-length vectors normalize to themselves, and parallel
//! ray/plane cases take their own branch.

pub mod bounds;
pub mod color;
pub mod curve;
pub mod eigen;
pub mod error;
pub mod intersect;
pub mod line_segment;
pub mod matrix;
pub mod plane;
pub mod quaternion;
pub mod ray;
pub mod spline;
pub mod transform;
pub mod triangle;
pub mod vector;

mod savable;

pub use bounds::*;
pub use color::*;
pub use curve::*;
pub use eigen::*;
pub use error::*;
pub use intersect::*;
pub use line_segment::*;
pub use matrix::*;
pub use plane::*;
pub use quaternion::*;
pub use ray::*;
pub use spline::*;
pub use transform::*;
pub use triangle::*;
pub use vector::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const TAU: f32 = PI * 2.0;
    pub const FRAC_PI_2: f32 = PI / 2.0;
    pub const FRAC_PI_4: f32 = PI / 4.0;
    pub const DEG_TO_RAD: f32 = PI / 180.0;
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
    pub const EPSILON: f32 = 1e-6;
    /// Smallest `x` with `1.0 + x != 1.0`
    pub const FLT_EPSILON: f32 = f32::EPSILON;
    /// Tolerance for "close enough to zero" in geometric tests
    pub const ZERO_TOLERANCE: f32 = 0.0001;
}

/// Convert degrees to radians
#[inline]
pub fn radians(degrees: f32) -> f32 {
    degrees * consts::DEG_TO_RAD
}

/// Convert radians to degrees
#[inline]
pub fn degrees(radians: f32) -> f32 {
    radians * consts::RAD_TO_DEG
}

/// Linear interpolation
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamp value between min and max
#[inline]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Smooth step interpolation
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Absolute-difference comparison
#[inline]
pub fn approx_eq(a: f32, b: f32, tolerance: f32) -> bool {
    (a - b).abs() <= tolerance
}

pub mod prelude {
    pub use crate::bounds::{BoundingBox, BoundingSphere, BoundingVolume};
    pub use crate::color::ColorRgba;
    pub use crate::curve::{
        bezier_length, catmull_rom_length, interpolate_bezier, interpolate_catmull_rom,
        interpolate_nurbs, nurbs_basis, prepare_nurbs_knots,
    };
    pub use crate::eigen::Eigen3;
    pub use crate::error::{SplineError, SplineResult};
    pub use crate::intersect::{
        interpolate_normal, interpolate_uv, ray_aabb, ray_plane, ray_sphere, ray_triangle,
        TriangleHit,
    };
    pub use crate::line_segment::LineSegment;
    pub use crate::matrix::{Mat3, Mat4};
    pub use crate::plane::{Plane, Side};
    pub use crate::quaternion::Quat;
    pub use crate::ray::Ray;
    pub use crate::spline::{Spline, SplineType};
    pub use crate::transform::Transform;
    pub use crate::triangle::Triangle;
    pub use crate::vector::{Vec2, Vec3, Vec4};
    pub use crate::{clamp, degrees, lerp, radians, smoothstep};
}
