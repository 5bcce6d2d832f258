//! Ray collision results

use strata_math::Vec3;

use crate::spatial::SpatialId;

/// One contact between a ray and a geometry
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionResult {
    /// World-space contact point
    pub contact_point: Vec3,
    /// World-space face normal at the contact
    pub contact_normal: Vec3,
    /// Distance from the ray origin in world units
    pub distance: f32,
    /// Triangle index within the hit mesh
    pub triangle_index: usize,
    /// Geometry that was hit, when collided through the scene
    pub geometry: Option<SpatialId>,
}

/// Collection of contacts, sorted by distance on demand
#[derive(Clone, Debug, Default)]
pub struct CollisionResults {
    results: Vec<CollisionResult>,
    sorted: bool,
}

impl CollisionResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collision(&mut self, result: CollisionResult) {
        self.results.push(result);
        self.sorted = false;
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.sorted = false;
    }

    fn sort(&mut self) {
        if !self.sorted {
            self.results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            self.sorted = true;
        }
    }

    /// Nearest contact
    pub fn closest(&mut self) -> Option<&CollisionResult> {
        self.sort();
        self.results.first()
    }

    /// Farthest contact
    pub fn farthest(&mut self) -> Option<&CollisionResult> {
        self.sort();
        self.results.last()
    }

    /// Contact `index` in distance order
    pub fn get(&mut self, index: usize) -> Option<&CollisionResult> {
        self.sort();
        self.results.get(index)
    }

    /// Contacts in distance order
    pub fn iter(&mut self) -> std::slice::Iter<'_, CollisionResult> {
        self.sort();
        self.results.iter()
    }

    /// Attach `geometry` to every contact added since `from`
    pub(crate) fn tag_from(&mut self, from: usize, geometry: SpatialId) {
        for result in self.results.iter_mut().skip(from) {
            result.geometry = Some(geometry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(distance: f32) -> CollisionResult {
        CollisionResult {
            contact_point: Vec3::new(0.0, 0.0, distance),
            contact_normal: Vec3::NEG_Z,
            distance,
            triangle_index: 0,
            geometry: None,
        }
    }

    #[test]
    fn test_closest_and_farthest() {
        let mut results = CollisionResults::new();
        assert!(results.closest().is_none());

        results.add_collision(hit(5.0));
        results.add_collision(hit(1.0));
        results.add_collision(hit(3.0));

        assert_eq!(results.len(), 3);
        assert_eq!(results.closest().map(|r| r.distance), Some(1.0));
        assert_eq!(results.farthest().map(|r| r.distance), Some(5.0));
        assert_eq!(results.get(1).map(|r| r.distance), Some(3.0));
    }

    #[test]
    fn test_iter_is_sorted_after_late_insert() {
        let mut results = CollisionResults::new();
        results.add_collision(hit(2.0));
        let _ = results.closest();
        results.add_collision(hit(0.5));

        let distances: Vec<f32> = results.iter().map(|r| r.distance).collect();
        assert_eq!(distances, vec![0.5, 2.0]);

        results.clear();
        assert!(results.is_empty());
    }
}
