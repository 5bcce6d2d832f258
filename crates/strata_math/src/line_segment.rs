//! Finite line segment stored as center, unit direction and half length

use crate::consts::ZERO_TOLERANCE;
use crate::vector::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSegment {
    /// Midpoint of the segment
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
    /// Half the segment length
    pub extent: f32,
}

impl LineSegment {
    #[inline]
    pub const fn new(origin: Vec3, direction: Vec3, extent: f32) -> Self {
        Self { origin, direction, extent }
    }

    pub fn from_points(start: Vec3, end: Vec3) -> Self {
        let delta = end - start;
        Self {
            origin: (start + end) * 0.5,
            direction: delta.normalize(),
            extent: delta.length() * 0.5,
        }
    }

    #[inline]
    pub fn start(&self) -> Vec3 {
        self.origin - self.direction * self.extent
    }

    #[inline]
    pub fn end(&self) -> Vec3 {
        self.origin + self.direction * self.extent
    }

    /// Point on the segment closest to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let param = self.direction.dot(point - self.origin);
        if -self.extent < param {
            if param < self.extent {
                self.origin + self.direction * param
            } else {
                self.end()
            }
        } else {
            self.start()
        }
    }

    pub fn distance_squared_to_point(&self, point: Vec3) -> f32 {
        (self.closest_point(point) - point).length_squared()
    }

    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.distance_squared_to_point(point).sqrt()
    }

    /// Squared distance between the closest points of two segments
    ///
    /// Parallel (or degenerate) segments take a separate branch that pins
    /// one parameter to the start of `self`.
    pub fn distance_squared(&self, other: &LineSegment) -> f32 {
        let p1 = self.start();
        let p2 = other.start();
        let d1 = self.end() - p1;
        let d2 = other.end() - p2;
        let r = p1 - p2;
        let a = d1.dot(d1);
        let e = d2.dot(d2);
        let f = d2.dot(r);

        let (s, t) = if a <= ZERO_TOLERANCE && e <= ZERO_TOLERANCE {
            (0.0, 0.0)
        } else if a <= ZERO_TOLERANCE {
            (0.0, (f / e).clamp(0.0, 1.0))
        } else {
            let c = d1.dot(r);
            if e <= ZERO_TOLERANCE {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else {
                let b = d1.dot(d2);
                let denom = a * e - b * b;
                // parallel: any s works, take the start
                let s = if denom.abs() > ZERO_TOLERANCE * a * e {
                    ((b * f - c * e) / denom).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let t = (b * s + f) / e;
                if t < 0.0 {
                    ((-c / a).clamp(0.0, 1.0), 0.0)
                } else if t > 1.0 {
                    (((b - c) / a).clamp(0.0, 1.0), 1.0)
                } else {
                    (s, t)
                }
            }
        };

        let c1 = p1 + d1 * s;
        let c2 = p2 + d2 * t;
        (c1 - c2).length_squared()
    }

    pub fn distance(&self, other: &LineSegment) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let seg = LineSegment::from_points(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(seg.origin, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(seg.direction, Vec3::X);
        assert_eq!(seg.extent, 2.0);
    }

    #[test]
    fn test_point_distance_clamps_to_ends() {
        let seg = LineSegment::from_points(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0));
        assert!((seg.distance_to_point(Vec3::new(2.0, 3.0, 0.0)) - 3.0).abs() < 1e-6);
        assert!((seg.distance_to_point(Vec3::new(7.0, 4.0, 0.0)) - 5.0).abs() < 1e-6);
        assert!((seg.distance_to_point(Vec3::new(-3.0, 0.0, 0.0)) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_crossing_segments() {
        let a = LineSegment::from_points(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let b = LineSegment::from_points(Vec3::new(0.0, -1.0, 2.0), Vec3::new(0.0, 1.0, 2.0));
        assert!((a.distance_squared(&b) - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_parallel_segments() {
        let a = LineSegment::from_points(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0));
        let b = LineSegment::from_points(Vec3::new(1.0, 3.0, 0.0), Vec3::new(5.0, 3.0, 0.0));
        assert!((a.distance_squared(&b) - 9.0).abs() < 1e-5);

        let c = LineSegment::from_points(Vec3::new(4.0, 1.0, 0.0), Vec3::new(6.0, 1.0, 0.0));
        // gap of 2 along X and 1 along Y
        assert!((a.distance_squared(&c) - 5.0).abs() < 1e-5);
    }
}
