//! Mesh data: vertex buffers, primitive mode, model bound and collision tree
//!
//! Buffers are reference counted. [`Mesh::shallow_clone`] shares them and
//! the first write through [`Mesh::buffer_mut`] detaches the writer's copy,
//! so clones never observe each other's edits.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use strata_core::{CapsuleError, InputCapsule, OutputCapsule, Savable};
use strata_math::{BoundingBox, BoundingSphere, BoundingVolume, Mat4, Ray, Vec2, Vec3};

use crate::buffer::{BufferData, BufferType, VertexBuffer};
use crate::bvh::TriangleBvh;
use crate::collision::{CollisionResult, CollisionResults};
use crate::error::{Result, SceneError};

/// Primitive assembly mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Points => "Points",
            Self::Lines => "Lines",
            Self::LineStrip => "LineStrip",
            Self::LineLoop => "LineLoop",
            Self::Triangles => "Triangles",
            Self::TriangleStrip => "TriangleStrip",
            Self::TriangleFan => "TriangleFan",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Points,
            Self::Lines,
            Self::LineStrip,
            Self::LineLoop,
            Self::Triangles,
            Self::TriangleStrip,
            Self::TriangleFan,
        ]
        .into_iter()
        .find(|m| m.name() == name)
    }

    /// List mode this mode converts to: `Points`, `Lines` or `Triangles`
    pub fn family(self) -> Self {
        match self {
            Self::Points => Self::Points,
            Self::Lines | Self::LineStrip | Self::LineLoop => Self::Lines,
            Self::Triangles | Self::TriangleStrip | Self::TriangleFan => Self::Triangles,
        }
    }

    /// Whether every element owns its own indices
    pub fn is_list(self) -> bool {
        matches!(self, Self::Points | Self::Lines | Self::Triangles)
    }

    /// Element count for `n` indices (or vertices when unindexed)
    pub fn element_count(self, n: usize) -> usize {
        match self {
            Self::Points => n,
            Self::Lines => n / 2,
            Self::LineStrip => n.saturating_sub(1),
            Self::LineLoop => {
                if n < 2 {
                    0
                } else {
                    n
                }
            }
            Self::Triangles => n / 3,
            Self::TriangleStrip | Self::TriangleFan => n.saturating_sub(2),
        }
    }
}

/// Geometric data drawn by a geometry
#[derive(Clone, Debug)]
pub struct Mesh {
    mode: Mode,
    buffers: BTreeMap<BufferType, Rc<VertexBuffer>>,
    bound: BoundingVolume,
    vert_count: usize,
    elem_count: usize,
    max_num_weights: i32,
    collision: OnceCell<TriangleBvh>,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new(Mode::Triangles)
    }
}

impl Mesh {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            buffers: BTreeMap::new(),
            bound: BoundingVolume::default(),
            vert_count: 0,
            elem_count: 0,
            max_num_weights: -1,
            collision: OnceCell::new(),
        }
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Insert or replace the buffer of `buffer.buffer_type()`
    pub fn set_buffer(&mut self, buffer: VertexBuffer) {
        self.buffers.insert(buffer.buffer_type(), Rc::new(buffer));
        self.update_counts();
        self.clear_collision_data();
    }

    /// Insert a float buffer
    pub fn set_buffer_f32(&mut self, buffer_type: BufferType, components: usize, data: Vec<f32>) {
        self.set_buffer(VertexBuffer::from_f32(buffer_type, components, data));
    }

    pub fn buffer(&self, buffer_type: BufferType) -> Option<&VertexBuffer> {
        self.buffers.get(&buffer_type).map(|b| &**b)
    }

    /// Mutable access; detaches the buffer from any shallow clone
    ///
    /// Callers changing the element count must call [`Mesh::update_counts`].
    pub fn buffer_mut(&mut self, buffer_type: BufferType) -> Option<&mut VertexBuffer> {
        let buffer = self.buffers.get_mut(&buffer_type)?;
        self.collision = OnceCell::new();
        Some(Rc::make_mut(buffer))
    }

    /// Remove a buffer; true if it was present
    pub fn clear_buffer(&mut self, buffer_type: BufferType) -> bool {
        let removed = self.buffers.remove(&buffer_type).is_some();
        if removed {
            self.update_counts();
            self.clear_collision_data();
        }
        removed
    }

    pub fn has_buffer(&self, buffer_type: BufferType) -> bool {
        self.buffers.contains_key(&buffer_type)
    }

    /// Buffers in [`BufferType`] order
    pub fn buffers(&self) -> impl Iterator<Item = &VertexBuffer> {
        self.buffers.values().map(|b| &**b)
    }

    /// Whether any buffer is shared with `other`
    pub fn shares_buffers_with(&self, other: &Mesh) -> bool {
        self.buffers
            .iter()
            .any(|(ty, b)| other.buffers.get(ty).is_some_and(|o| Rc::ptr_eq(b, o)))
    }

    // ========================================================================
    // Counts and access
    // ========================================================================

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.update_counts();
        self.clear_collision_data();
    }

    /// Recompute vertex and element counts from the buffers
    pub fn update_counts(&mut self) {
        self.vert_count = self
            .buffer(BufferType::Position)
            .map_or(0, VertexBuffer::num_elements);
        let n = self
            .buffer(BufferType::Index)
            .map_or(self.vert_count, |ib| ib.data().len());
        self.elem_count = self.mode.element_count(n);
    }

    pub fn vertex_count(&self) -> usize {
        self.vert_count
    }

    /// Primitive count in the current mode
    pub fn element_count(&self) -> usize {
        self.elem_count
    }

    /// Triangle count; zero for point and line meshes
    pub fn triangle_count(&self) -> usize {
        if self.mode.family() == Mode::Triangles {
            self.elem_count
        } else {
            0
        }
    }

    pub fn max_num_weights(&self) -> i32 {
        self.max_num_weights
    }

    pub fn set_max_num_weights(&mut self, weights: i32) {
        self.max_num_weights = weights;
    }

    /// Vertex index at position `i` of the index stream
    ///
    /// Unindexed meshes use the identity mapping.
    pub fn index_at(&self, i: usize) -> Option<u32> {
        match self.buffer(BufferType::Index) {
            Some(ib) => ib.index(i),
            None if i < self.vert_count => u32::try_from(i).ok(),
            None => None,
        }
    }

    fn index_stream_len(&self) -> usize {
        self.buffer(BufferType::Index)
            .map_or(self.vert_count, |ib| ib.data().len())
    }

    /// Vertex indices of triangle `i`, with strip winding corrected
    pub fn triangle_indices(&self, i: usize) -> Option<[u32; 3]> {
        if i >= self.triangle_count() {
            return None;
        }
        let slots = match self.mode {
            Mode::Triangles => [i * 3, i * 3 + 1, i * 3 + 2],
            Mode::TriangleStrip if i % 2 == 0 => [i, i + 1, i + 2],
            Mode::TriangleStrip => [i + 1, i, i + 2],
            Mode::TriangleFan => [0, i + 1, i + 2],
            _ => return None,
        };
        Some([
            self.index_at(slots[0])?,
            self.index_at(slots[1])?,
            self.index_at(slots[2])?,
        ])
    }

    /// Corner positions of triangle `i`
    pub fn triangle(&self, i: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = self.triangle_indices(i)?;
        let pos = self.buffer(BufferType::Position)?;
        Some([
            pos.vec3(a as usize)?,
            pos.vec3(b as usize)?,
            pos.vec3(c as usize)?,
        ])
    }

    /// Index stream expanded to the list form of [`Mode::family`]
    pub fn indices_as_list(&self) -> Vec<u32> {
        let n = self.index_stream_len();
        let at = |i: usize| self.index_at(i);
        match self.mode {
            Mode::Points | Mode::Lines | Mode::Triangles => (0..n).filter_map(at).collect(),
            Mode::LineStrip | Mode::LineLoop => {
                let mut out = Vec::with_capacity(self.elem_count * 2);
                let mut segment = |a: usize, b: usize| {
                    if let (Some(a), Some(b)) = (at(a), at(b)) {
                        out.push(a);
                        out.push(b);
                    }
                };
                for i in 0..n.saturating_sub(1) {
                    segment(i, i + 1);
                }
                if self.mode == Mode::LineLoop && n >= 2 {
                    segment(n - 1, 0);
                }
                out
            }
            Mode::TriangleStrip | Mode::TriangleFan => (0..self.elem_count)
                .filter_map(|i| self.triangle_indices(i))
                .flatten()
                .collect(),
        }
    }

    /// All positions
    pub fn positions(&self) -> Vec<Vec3> {
        let Some(pos) = self.buffer(BufferType::Position) else {
            return Vec::new();
        };
        (0..pos.num_elements()).filter_map(|i| pos.vec3(i)).collect()
    }

    // ========================================================================
    // Bounds and validation
    // ========================================================================

    pub fn bound(&self) -> &BoundingVolume {
        &self.bound
    }

    pub fn set_bound(&mut self, bound: BoundingVolume) {
        self.bound = bound;
    }

    /// Refit the model bound to the positions, keeping the volume kind
    pub fn update_bound(&mut self) {
        let positions = self.positions();
        if positions.is_empty() {
            return;
        }
        self.bound = match self.bound {
            BoundingVolume::Box(_) => BoundingBox::from_points(&positions).into(),
            BoundingVolume::Sphere(_) => BoundingSphere::from_points(&positions).into(),
        };
    }

    /// Check that every attribute has one element per vertex and every
    /// index names an existing vertex
    pub fn validate(&self) -> Result<()> {
        for buffer in self.buffers() {
            let ty = buffer.buffer_type();
            if buffer.components() == 0 {
                return Err(SceneError::InvalidBuffer(format!(
                    "{} buffer has zero components",
                    ty.name()
                )));
            }
            if buffer.data().len() % buffer.components() != 0 {
                return Err(SceneError::InvalidBuffer(format!(
                    "{} buffer length {} is not a multiple of {} components",
                    ty.name(),
                    buffer.data().len(),
                    buffer.components()
                )));
            }
            if ty != BufferType::Index
                && ty != BufferType::InterleavedData
                && buffer.num_elements() != self.vert_count
            {
                return Err(SceneError::InvalidBuffer(format!(
                    "{} buffer has {} elements, mesh has {} vertices",
                    ty.name(),
                    buffer.num_elements(),
                    self.vert_count
                )));
            }
        }

        if let Some(ib) = self.buffer(BufferType::Index) {
            if let Some(max) = ib.to_u32_vec().into_iter().max() {
                if max as usize >= self.vert_count {
                    return Err(SceneError::InvalidBuffer(format!(
                        "index {} out of range for {} vertices",
                        max, self.vert_count
                    )));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Collision
    // ========================================================================

    /// Triangle tree in model space, built on first use
    pub fn collision_tree(&self) -> &TriangleBvh {
        self.collision.get_or_init(|| {
            let triangles = (0..self.triangle_count())
                .filter_map(|i| self.triangle(i))
                .collect();
            TriangleBvh::build(triangles)
        })
    }

    pub fn clear_collision_data(&mut self) {
        self.collision = OnceCell::new();
    }

    /// Collide a world-space ray with this mesh placed by `world`
    ///
    /// Contacts and distances are reported in world space. Returns the
    /// number of contacts added.
    pub fn collide_with(&self, ray: &Ray, world: &Mat4, results: &mut CollisionResults) -> usize {
        if self.mode.family() != Mode::Triangles {
            return 0;
        }
        let Some(inverse) = world.try_invert() else {
            return 0;
        };

        let model_ray = Ray::new(
            inverse.transform_point(ray.origin),
            inverse.transform_vector(ray.direction),
        );
        let normal_matrix = inverse.to_mat3().transpose();
        let tree = self.collision_tree();

        let mut added = 0;
        for hit in tree.query_ray(&model_ray) {
            let Some([v0, v1, v2]) = tree.triangle(hit.triangle_index) else {
                continue;
            };
            let contact_point = world.transform_point(model_ray.at(hit.hit.distance));
            let distance = contact_point.distance(ray.origin);
            if distance > ray.limit {
                continue;
            }
            let face_normal = (v1 - v0).cross(v2 - v0);
            results.add_collision(CollisionResult {
                contact_point,
                contact_normal: (normal_matrix * face_normal).normalize(),
                distance,
                triangle_index: hit.triangle_index,
                geometry: None,
            });
            added += 1;
        }
        added
    }

    // ========================================================================
    // Cloning
    // ========================================================================

    /// Copy sharing the vertex buffers
    pub fn shallow_clone(&self) -> Self {
        self.clone()
    }

    /// Copy with independent vertex buffers
    pub fn deep_clone(&self) -> Self {
        Self {
            mode: self.mode,
            buffers: self
                .buffers
                .iter()
                .map(|(ty, b)| (*ty, Rc::new(b.deep_clone())))
                .collect(),
            bound: self.bound,
            vert_count: self.vert_count,
            elem_count: self.elem_count,
            max_num_weights: self.max_num_weights,
            collision: OnceCell::new(),
        }
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Axis-aligned box with shared corners: 8 vertices, 12 triangles
    pub fn cube(half_extent: Vec3) -> Self {
        let h = half_extent;
        let corners = [
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let normals: Vec<Vec3> = corners.iter().map(|c| c.normalize()).collect();
        #[rustfmt::skip]
        let indices: Vec<u16> = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
        ];

        let mut mesh = Self::new(Mode::Triangles);
        mesh.set_buffer(VertexBuffer::from_vec3(BufferType::Position, &corners));
        mesh.set_buffer(VertexBuffer::from_vec3(BufferType::Normal, &normals));
        mesh.set_buffer(VertexBuffer::from_u16_indices(indices));
        mesh.update_bound();
        mesh
    }

    /// Quad in the XY plane from the origin to (`width`, `height`), facing +Z
    pub fn quad(width: f32, height: f32) -> Self {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(width, 0.0, 0.0),
            Vec3::new(width, height, 0.0),
            Vec3::new(0.0, height, 0.0),
        ];
        let uvs = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];

        let mut mesh = Self::new(Mode::Triangles);
        mesh.set_buffer(VertexBuffer::from_vec3(BufferType::Position, &positions));
        mesh.set_buffer(VertexBuffer::from_vec3(BufferType::Normal, &[Vec3::Z; 4]));
        mesh.set_buffer_f32(
            BufferType::TexCoord,
            2,
            uvs.iter().flat_map(|uv| uv.to_array()).collect(),
        );
        mesh.set_buffer(VertexBuffer::from_u16_indices(vec![0, 1, 2, 0, 2, 3]));
        mesh.update_bound();
        mesh
    }

    /// Unindexed line strip through `points`
    pub fn line_strip(points: &[Vec3]) -> Self {
        let mut mesh = Self::new(Mode::LineStrip);
        mesh.set_buffer(VertexBuffer::from_vec3(BufferType::Position, points));
        mesh.update_bound();
        mesh
    }
}

impl Savable for Mesh {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_savable("modelBound", Some(&self.bound));
        out.write_i32("vertCount", self.vert_count as i32, -1);
        out.write_i32("elementCount", self.elem_count as i32, -1);
        out.write_i32("max_num_weights", self.max_num_weights, -1);
        out.write_string("mode", Some(self.mode.name()), Some(Mode::Triangles.name()));
        let buffers: Vec<(&str, &dyn Savable)> = self
            .buffers
            .iter()
            .map(|(ty, b)| (ty.name(), &**b as &dyn Savable))
            .collect();
        out.write_savable_map("buffers", &buffers);
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let mode_name = input
            .read_string("mode", Some(Mode::Triangles.name()))?
            .unwrap_or_default();
        let mode = Mode::from_name(&mode_name).ok_or_else(|| CapsuleError::InvalidValue {
            field: "mode".into(),
            reason: format!("unknown mode {}", mode_name),
        })?;

        let mut mesh = Mesh::new(mode);
        for (_, child) in input.read_child_map("buffers")? {
            let buffer = VertexBuffer::read(child)?;
            mesh.buffers.insert(buffer.buffer_type(), Rc::new(buffer));
        }
        mesh.update_counts();
        mesh.max_num_weights = input.read_i32("max_num_weights", -1)?;
        if let Some(bound) = strata_core::read_savable::<BoundingVolume>(input, "modelBound")? {
            mesh.bound = bound;
        } else {
            mesh.update_bound();
        }
        Ok(mesh)
    }
}

/// Merge index data of several meshes, offsetting each by its start vertex
pub(crate) fn merge_indices(parts: &[(&Mesh, usize)], total_vertices: usize) -> BufferData {
    let mut indices = Vec::new();
    for (mesh, start) in parts {
        let offset = *start as u32;
        indices.extend(mesh.indices_as_list().into_iter().map(|i| i + offset));
    }
    BufferData::indices_for(total_vertices, indices)
}
