//! Triangle with lazily computed center and normal

use core::cell::Cell;

use crate::vector::Vec3;

#[derive(Clone, Debug, PartialEq)]
pub struct Triangle {
    points: [Vec3; 3],
    center: Cell<Option<Vec3>>,
    normal: Cell<Option<Vec3>>,
    /// Index of the triangle inside its mesh, when it came from one
    pub index: usize,
}

impl Triangle {
    pub fn new(p1: Vec3, p2: Vec3, p3: Vec3) -> Self {
        Self {
            points: [p1, p2, p3],
            center: Cell::new(None),
            normal: Cell::new(None),
            index: 0,
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> Vec3 {
        self.points[i]
    }

    #[inline]
    pub fn points(&self) -> &[Vec3; 3] {
        &self.points
    }

    pub fn set(&mut self, i: usize, point: Vec3) {
        self.points[i] = point;
        self.center.set(None);
        self.normal.set(None);
    }

    pub fn set_all(&mut self, p1: Vec3, p2: Vec3, p3: Vec3) {
        self.points = [p1, p2, p3];
        self.center.set(None);
        self.normal.set(None);
    }

    /// Centroid of the three points
    pub fn center(&self) -> Vec3 {
        if let Some(c) = self.center.get() {
            return c;
        }
        let c = (self.points[0] + self.points[1] + self.points[2]) / 3.0;
        self.center.set(Some(c));
        c
    }

    /// Unit normal following counter-clockwise winding
    pub fn normal(&self) -> Vec3 {
        if let Some(n) = self.normal.get() {
            return n;
        }
        let [a, b, c] = self.points;
        let n = (b - a).cross(c - a).normalize();
        self.normal.set(Some(n));
        n
    }

    pub fn area(&self) -> f32 {
        let [a, b, c] = self.points;
        (b - a).cross(c - a).length() * 0.5
    }
}

impl Default for Triangle {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO, Vec3::ZERO)
    }
}
