//! Bounding volume hierarchy over mesh triangles
//!
//! Built lazily by [`crate::mesh::Mesh`] the first time a ray is tested
//! against it. Nodes split at the median centroid along the largest extent;
//! leaves hold up to [`MAX_TRIS_PER_LEAF`] triangles.

use strata_math::{ray_aabb, ray_triangle, BoundingBox, Ray, TriangleHit, Vec3};

/// Largest triangle count stored in a leaf
pub const MAX_TRIS_PER_LEAF: usize = 21;

#[derive(Clone, Debug)]
struct BvhNode {
    bounds: BoundingBox,
    /// First slot in `order` (leaves only)
    start: usize,
    /// Triangle count; zero for interior nodes
    count: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// A ray hit on one triangle, in the space the tree was built in
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhHit {
    pub triangle_index: usize,
    pub hit: TriangleHit,
}

/// Triangle hierarchy for ray and box queries
#[derive(Clone, Debug, Default)]
pub struct TriangleBvh {
    nodes: Vec<BvhNode>,
    triangles: Vec<[Vec3; 3]>,
    /// Triangle indices permuted into leaf order
    order: Vec<usize>,
    root: Option<usize>,
}

impl TriangleBvh {
    /// Build from triangles; a triangle's index is its position in `triangles`
    pub fn build(triangles: Vec<[Vec3; 3]>) -> Self {
        let mut bvh = Self {
            nodes: Vec::new(),
            order: (0..triangles.len()).collect(),
            triangles,
            root: None,
        };
        if bvh.triangles.is_empty() {
            return bvh;
        }

        let mut items: Vec<(usize, BoundingBox, Vec3)> = bvh
            .triangles
            .iter()
            .enumerate()
            .map(|(i, tri)| {
                let bounds = BoundingBox::from_points(tri);
                (i, bounds, bounds.center)
            })
            .collect();

        let root = bvh.build_recursive(&mut items, 0);
        bvh.order = items.iter().map(|(i, _, _)| *i).collect();
        bvh.root = Some(root);
        bvh
    }

    fn build_recursive(&mut self, items: &mut [(usize, BoundingBox, Vec3)], offset: usize) -> usize {
        let node_index = self.nodes.len();

        let bounds = items[1..]
            .iter()
            .fold(items[0].1, |acc, (_, b, _)| acc.merge(b));

        if items.len() <= MAX_TRIS_PER_LEAF {
            self.nodes.push(BvhNode {
                bounds,
                start: offset,
                count: items.len(),
                left: None,
                right: None,
            });
            return node_index;
        }

        // Choose split axis (largest extent)
        let extent = bounds.extent;
        let axis = if extent.x > extent.y && extent.x > extent.z {
            0
        } else if extent.y > extent.z {
            1
        } else {
            2
        };

        items.sort_by(|a, b| a.2[axis].total_cmp(&b.2[axis]));

        let mid = items.len() / 2;
        let (left_items, right_items) = items.split_at_mut(mid);

        // Reserve the interior slot before recursing
        self.nodes.push(BvhNode {
            bounds,
            start: 0,
            count: 0,
            left: None,
            right: None,
        });

        let left = self.build_recursive(left_items, offset);
        let right = self.build_recursive(right_items, offset + mid);

        self.nodes[node_index].left = Some(left);
        self.nodes[node_index].right = Some(right);
        node_index
    }

    /// All triangles hit by `ray`, sorted by distance
    pub fn query_ray(&self, ray: &Ray) -> Vec<BvhHit> {
        let mut results = Vec::new();
        if let Some(root) = self.root {
            self.query_ray_recursive(root, ray, &mut results);
        }
        results.sort_by(|a, b| a.hit.distance.total_cmp(&b.hit.distance));
        results
    }

    fn query_ray_recursive(&self, node_idx: usize, ray: &Ray, results: &mut Vec<BvhHit>) {
        let node = &self.nodes[node_idx];

        let Some(t) = ray_aabb(ray, node.bounds.min(), node.bounds.max()) else {
            return;
        };
        if t > ray.limit {
            return;
        }

        for &triangle_index in &self.order[node.start..node.start + node.count] {
            let [v0, v1, v2] = self.triangles[triangle_index];
            if let Some(hit) = ray_triangle(ray, v0, v1, v2, false) {
                results.push(BvhHit { triangle_index, hit });
            }
        }

        if let Some(left) = node.left {
            self.query_ray_recursive(left, ray, results);
        }
        if let Some(right) = node.right {
            self.query_ray_recursive(right, ray, results);
        }
    }

    /// Indices of triangles whose bounds overlap `query`
    pub fn query_box(&self, query: &BoundingBox) -> Vec<usize> {
        let mut results = Vec::new();
        if let Some(root) = self.root {
            self.query_box_recursive(root, query, &mut results);
        }
        results
    }

    fn query_box_recursive(&self, node_idx: usize, query: &BoundingBox, results: &mut Vec<usize>) {
        let node = &self.nodes[node_idx];

        if !node.bounds.intersects_box(query) {
            return;
        }

        for &triangle_index in &self.order[node.start..node.start + node.count] {
            if BoundingBox::from_points(&self.triangles[triangle_index]).intersects_box(query) {
                results.push(triangle_index);
            }
        }

        if let Some(left) = node.left {
            self.query_box_recursive(left, query, results);
        }
        if let Some(right) = node.right {
            self.query_box_recursive(right, query, results);
        }
    }

    pub fn triangle(&self, index: usize) -> Option<[Vec3; 3]> {
        self.triangles.get(index).copied()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Bounds of every triangle in the tree
    pub fn root_bounds(&self) -> Option<BoundingBox> {
        self.root.map(|r| self.nodes[r].bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A row of unit quads along X, two triangles each, facing +Z
    fn strip(quads: usize) -> Vec<[Vec3; 3]> {
        let mut tris = Vec::new();
        for i in 0..quads {
            let x = i as f32;
            let a = Vec3::new(x, 0.0, 0.0);
            let b = Vec3::new(x + 1.0, 0.0, 0.0);
            let c = Vec3::new(x + 1.0, 1.0, 0.0);
            let d = Vec3::new(x, 1.0, 0.0);
            tris.push([a, b, c]);
            tris.push([a, c, d]);
        }
        tris
    }

    #[test]
    fn test_empty() {
        let bvh = TriangleBvh::build(Vec::new());
        assert!(bvh.is_empty());
        assert!(bvh.query_ray(&Ray::new(Vec3::ZERO, Vec3::Z)).is_empty());
        assert_eq!(bvh.root_bounds(), None);
    }

    #[test]
    fn test_splits_large_input() {
        let bvh = TriangleBvh::build(strip(40));
        assert_eq!(bvh.triangle_count(), 80);
        assert!(bvh.node_count() > 1);
        let bounds = bvh.root_bounds().unwrap();
        assert!((bounds.max().x - 40.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_finds_single_triangle() {
        let bvh = TriangleBvh::build(strip(40));
        let ray = Ray::new(Vec3::new(25.75, 0.25, -2.0), Vec3::Z);
        let hits = bvh.query_ray(&ray);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].triangle_index, 50);
        assert!((hits[0].hit.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_limit_prunes() {
        let bvh = TriangleBvh::build(strip(4));
        let ray = Ray::new(Vec3::new(0.75, 0.25, -2.0), Vec3::Z).with_limit(1.0);
        assert!(bvh.query_ray(&ray).is_empty());
    }

    #[test]
    fn test_box_query() {
        let bvh = TriangleBvh::build(strip(40));
        let query = BoundingBox::new(Vec3::new(10.5, 0.5, 0.0), Vec3::new(0.1, 0.1, 0.1));
        let mut hits = bvh.query_box(&query);
        hits.sort_unstable();
        assert_eq!(hits, vec![20, 21]);
    }
}
