//! Geometry batching
//!
//! A batch node merges the meshes of the geometries below it into one mesh
//! per material. Each merged mesh is held by an output geometry attached to
//! the batch node, so it lives in batch-node space. Members keep their own
//! mesh and get a [`BatchedGeometry`] record naming their vertex slice.
//!
//! When a member moves, only its slice is rewritten, by the offset between
//! its current and previous member-to-batch transform.
//!
//! # Usage
//!
//! ```ignore
//! let batch_node = scene.create_batch_node("level");
//! for block in blocks {
//!     scene.attach_child(batch_node, block)?;
//! }
//! scene.batch(batch_node)?;
//!
//! // Moving a member rewrites its slice on the next update
//! scene.move_local(blocks[1], Vec3::Y)?;
//! scene.update_geometric_state(root)?;
//! ```

use std::rc::Rc;

use strata_math::consts::FLT_EPSILON;
use strata_math::Mat4;

use crate::buffer::{BufferType, Format, VertexBuffer};
use crate::error::{Result, SceneError};
use crate::graph::Scene;
use crate::material::Material;
use crate::mesh::{self, Mesh};
use crate::spatial::{BatchHint, Spatial, SpatialId};

/// Batch bookkeeping of a batch node
#[derive(Debug, Default)]
pub struct BatchState {
    pub(crate) batches: Vec<Batch>,
    pub(crate) needs_full_rebatch: bool,
}

impl BatchState {
    /// State for a copied batch node: nothing merged yet
    pub(crate) fn detached_copy(&self) -> Self {
        Self {
            batches: Vec::new(),
            needs_full_rebatch: self.needs_full_rebatch || !self.batches.is_empty(),
        }
    }
}

/// One merged mesh and the geometries it stands in for
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) output: SpatialId,
    pub(crate) material: Rc<Material>,
    pub(crate) members: Vec<SpatialId>,
    /// Members moved since the output's model bound was last fit
    pub(crate) dirty_bound: bool,
}

/// Slice record of a batched geometry
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchedGeometry {
    pub(crate) batch_node: SpatialId,
    pub(crate) output: SpatialId,
    pub(crate) start_index: usize,
    pub(crate) vertex_count: usize,
    pub(crate) cached_offset_mat: Mat4,
    pub(crate) prev_transform: Mat4,
}

impl BatchedGeometry {
    pub fn batch_node(&self) -> SpatialId {
        self.batch_node
    }

    /// Geometry holding the merged mesh
    pub fn output(&self) -> SpatialId {
        self.output
    }

    /// First vertex of the slice in the merged mesh
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Offset applied by the last slice update
    pub fn cached_offset_mat(&self) -> &Mat4 {
        &self.cached_offset_mat
    }

    /// Member-to-batch transform the slice currently reflects
    pub fn prev_transform(&self) -> &Mat4 {
        &self.prev_transform
    }
}

/// Rewrite elements `start..start + count` of a position or direction buffer
///
/// Other buffers are left alone.
fn transform_range(buffer: &mut VertexBuffer, start: usize, count: usize, mat: &Mat4) {
    let ty = buffer.buffer_type();
    if ty != BufferType::Position && !ty.is_direction() {
        return;
    }
    let linear = mat.to_mat3();
    for i in start..start + count {
        let Some(v) = buffer.vec3(i) else {
            continue;
        };
        let out = if ty == BufferType::Position {
            mat.transform_point(v)
        } else {
            (linear * v).normalize()
        };
        buffer.set_vec3(i, out);
    }
}

/// Buffer types of a mesh other than the index buffer
fn vertex_layout(mesh: &Mesh) -> Vec<(BufferType, usize, Format)> {
    mesh.buffers()
        .filter(|b| b.buffer_type() != BufferType::Index)
        .map(|b| (b.buffer_type(), b.components(), b.format()))
        .collect()
}

impl Scene {
    // ========================================================================
    // Batch construction
    // ========================================================================

    /// Merge the geometry below `batch_node`; returns the number of batches
    ///
    /// Previous batches of the node are dropped first.
    pub fn batch(&mut self, batch_node: SpatialId) -> Result<usize> {
        // Step 1: validate the node and drop earlier outputs
        if self.node_data(batch_node)?.batch.is_none() {
            return Err(SceneError::NotABatchNode(batch_node));
        }
        self.unbatch(batch_node)?;

        // Step 2: gather members and group them by material identity
        let members = self.gather_batch_members(batch_node)?;
        let mut groups: Vec<(Rc<Material>, Vec<SpatialId>)> = Vec::new();
        for &member in &members {
            let spatial = self.get(member)?;
            if spatial.mesh().is_none() {
                return Err(SceneError::MissingMesh(spatial.display_name()));
            }
            let material = spatial
                .material()
                .cloned()
                .ok_or_else(|| SceneError::MissingMaterial(spatial.display_name()))?;
            match groups.iter_mut().find(|(m, _)| Rc::ptr_eq(m, &material)) {
                Some((_, group)) => group.push(member),
                None => groups.push((material, vec![member])),
            }
        }

        // Step 3: merge every group before touching the tree
        let base_name = self.get(batch_node)?.display_name();
        let mut merged = Vec::with_capacity(groups.len());
        for (material, group) in groups {
            let transforms = group
                .iter()
                .map(|&m| self.member_to_batch(m, batch_node))
                .collect::<Result<Vec<_>>>()?;
            let (mesh, slices) = self.merge_group(&group, &transforms)?;
            merged.push((material, group, transforms, mesh, slices));
        }

        // Step 4: attach outputs and write member records
        let mut batches = Vec::with_capacity(merged.len());
        for (i, (material, group, transforms, mesh, slices)) in merged.into_iter().enumerate() {
            let mut output = Spatial::geometry(Some(format!("{}-batch{}", base_name, i)), Some(mesh));
            if let Some(geometry) = output.as_geometry_mut() {
                geometry.material = Some(Rc::clone(&material));
                geometry.batch_output_of = Some(batch_node);
            }
            let output = self.spatials.insert(output);
            self.attach_child(batch_node, output)?;

            for ((&member, transform), (start_index, vertex_count)) in
                group.iter().zip(transforms).zip(slices)
            {
                self.geometry_data_mut(member)?.batch = Some(BatchedGeometry {
                    batch_node,
                    output,
                    start_index,
                    vertex_count,
                    cached_offset_mat: Mat4::IDENTITY,
                    prev_transform: transform,
                });
            }
            batches.push(Batch {
                output,
                material,
                members: group,
                dirty_bound: false,
            });
        }

        let count = batches.len();
        if let Some(state) = self.node_data_mut(batch_node)?.batch.as_mut() {
            state.batches = batches;
            state.needs_full_rebatch = false;
        }
        log::debug!(
            "Batched {} geometries of '{}' into {} batches",
            members.len(),
            base_name,
            count
        );
        Ok(count)
    }

    /// Geometry leaves that take part in a batch of `batch_node`, pre-order
    fn gather_batch_members(&self, batch_node: SpatialId) -> Result<Vec<SpatialId>> {
        let mut members = Vec::new();
        let mut stack: Vec<SpatialId> = self.children(batch_node)?.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let spatial = self.get(id)?;
            if spatial.is_batch_output() || spatial.is_batch_node() {
                continue;
            }
            if self.batch_hint(id)? == BatchHint::Never {
                continue;
            }
            if spatial.is_geometry() {
                if !spatial.ignores_transform() {
                    members.push(id);
                }
            } else {
                stack.extend(spatial.children().iter().rev().copied());
            }
        }
        Ok(members)
    }

    /// Product of local transforms from `member` up to, not including, `batch_node`
    pub(crate) fn member_to_batch(&self, member: SpatialId, batch_node: SpatialId) -> Result<Mat4> {
        let spatial = self.get(member)?;
        let mut matrix = spatial.local_transform.to_matrix();
        let mut current = spatial.parent;
        while let Some(p) = current {
            if p == batch_node {
                break;
            }
            let parent = self.get(p)?;
            matrix = parent.local_transform.to_matrix() * matrix;
            current = parent.parent;
        }
        Ok(matrix)
    }

    /// Merge one material group; returns the mesh and the (start, count) slices
    fn merge_group(&self, group: &[SpatialId], transforms: &[Mat4]) -> Result<(Mesh, Vec<(usize, usize)>)> {
        let meshes = group
            .iter()
            .map(|&m| {
                let spatial = self.get(m)?;
                spatial
                    .mesh()
                    .ok_or_else(|| SceneError::MissingMesh(spatial.display_name()))
            })
            .collect::<Result<Vec<&Mesh>>>()?;
        let Some(first) = meshes.first() else {
            return Ok((Mesh::default(), Vec::new()));
        };

        // Step 1: every member must be valid and share the primitive family and layout
        let family = first.mode().family();
        let layout = vertex_layout(first);
        for (&id, mesh) in group.iter().zip(&meshes) {
            let name = self.get(id)?.display_name();
            mesh.validate().map_err(|e| match e {
                SceneError::InvalidBuffer(reason) => {
                    SceneError::InvalidBuffer(format!("mesh of '{}': {}", name, reason))
                }
                other => other,
            })?;
            if mesh.mode().family() != family {
                return Err(SceneError::Unsupported(format!(
                    "cannot batch {} mesh of '{}' with {} meshes",
                    mesh.mode().name(),
                    name,
                    family.name()
                )));
            }
            if vertex_layout(mesh) != layout {
                return Err(SceneError::InvalidBuffer(format!(
                    "vertex buffers of '{}' do not match the rest of its batch",
                    name
                )));
            }
        }

        // Step 2: concatenate attribute data, transformed per slice
        let total: usize = meshes.iter().map(|m| m.vertex_count()).sum();
        let mut merged = Mesh::new(family);
        for &(ty, components, _) in &layout {
            let Some(template) = first.buffer(ty) else {
                continue;
            };
            let mut data = template.data().empty_like(total * components);
            for mesh in &meshes {
                if let Some(buffer) = mesh.buffer(ty) {
                    data.extend_from(buffer.data());
                }
            }
            let mut buffer = VertexBuffer::new(ty, components, data);
            buffer.set_normalized(template.is_normalized());
            buffer.set_usage(self.config.batch_usage);

            let mut start = 0;
            for (mesh, transform) in meshes.iter().zip(transforms) {
                transform_range(&mut buffer, start, mesh.vertex_count(), transform);
                start += mesh.vertex_count();
            }
            merged.set_buffer(buffer);
        }

        // Step 3: offset indices, converted to list form
        let mut slices = Vec::with_capacity(meshes.len());
        let mut start = 0;
        for mesh in &meshes {
            slices.push((start, mesh.vertex_count()));
            start += mesh.vertex_count();
        }
        let parts: Vec<(&Mesh, usize)> = meshes
            .iter()
            .zip(&slices)
            .map(|(&mesh, &(start, _))| (mesh, start))
            .collect();
        let mut indices = VertexBuffer::new(BufferType::Index, 1, mesh::merge_indices(&parts, total));
        indices.set_usage(self.config.batch_usage);
        merged.set_buffer(indices);

        merged.set_max_num_weights(meshes.iter().map(|m| m.max_num_weights()).max().unwrap_or(-1));
        merged.update_bound();
        Ok((merged, slices))
    }

    /// Remove the merged meshes of `batch_node` and clear member records
    pub fn unbatch(&mut self, batch_node: SpatialId) -> Result<()> {
        let state = self
            .node_data_mut(batch_node)?
            .batch
            .as_mut()
            .ok_or(SceneError::NotABatchNode(batch_node))?;
        let batches = std::mem::take(&mut state.batches);
        state.needs_full_rebatch = false;

        for batch in batches {
            for member in batch.members {
                if let Some(geometry) = self.spatials.get_mut(member).and_then(Spatial::as_geometry_mut) {
                    if geometry.batch.is_some_and(|r| r.batch_node == batch_node) {
                        geometry.batch = None;
                    }
                }
            }
            if self.spatials.contains(batch.output) {
                self.detach_child(batch_node, batch.output)?;
                self.spatials.remove(batch.output);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Incremental updates
    // ========================================================================

    /// Rewrite a member's slice after its member-to-batch transform changed
    pub(crate) fn update_sub_batch(&mut self, member: SpatialId) -> Result<()> {
        let Some(record) = self.geometry_data(member)?.batch else {
            return Ok(());
        };
        if !self.spatials.contains(record.output) {
            log::warn!("Batch output {:?} of {:?} no longer exists", record.output, member);
            return Ok(());
        }

        let new = self.member_to_batch(member, record.batch_node)?;
        if new.approx_eq(&record.prev_transform, FLT_EPSILON) {
            return Ok(());
        }

        let range = record.start_index..record.start_index + record.vertex_count;
        let offset = match record.prev_transform.try_invert() {
            Some(inverse_prev) => {
                let offset = new * inverse_prev;
                let Some(output) = self.geometry_data_mut(record.output)?.mesh.as_mut() else {
                    log::warn!("Batch output {:?} lost its mesh", record.output);
                    return Ok(());
                };
                for ty in vertex_layout(output).into_iter().map(|(ty, _, _)| ty) {
                    if let Some(buffer) = output.buffer_mut(ty) {
                        transform_range(buffer, range.start, record.vertex_count, &offset);
                    }
                }
                offset
            }
            None => {
                // A singular previous transform collapsed the slice; copy it afresh
                let (source, target) = self
                    .spatials
                    .get2_mut(member, record.output)
                    .ok_or(SceneError::StaleHandle(record.output))?;
                let target = target.as_geometry_mut().and_then(|g| g.mesh.as_mut());
                let (Some(source), Some(target)) = (source.mesh(), target) else {
                    return Ok(());
                };
                for ty in vertex_layout(source).into_iter().map(|(ty, _, _)| ty) {
                    let (Some(from), Some(to)) = (source.buffer(ty), target.buffer_mut(ty)) else {
                        continue;
                    };
                    for i in 0..record.vertex_count {
                        if let Some(v) = from.vec3(i) {
                            to.set_vec3(range.start + i, v);
                        }
                    }
                    transform_range(to, range.start, record.vertex_count, &new);
                }
                new
            }
        };

        if let Some(geometry) = self.spatials.get_mut(member).and_then(Spatial::as_geometry_mut) {
            if let Some(record) = geometry.batch.as_mut() {
                record.prev_transform = new;
                record.cached_offset_mat = offset;
            }
        }
        if let Some(state) = self.node_data_mut(record.batch_node)?.batch.as_mut() {
            if let Some(batch) = state.batches.iter_mut().find(|b| b.output == record.output) {
                batch.dirty_bound = true;
            }
        }
        self.set_bound_refresh(record.output)?;

        log::trace!(
            "Updated batch slice {:?} of {:?} ({} vertices)",
            range,
            member,
            record.vertex_count
        );
        Ok(())
    }

    /// Refit the model bound of a merged mesh whose members moved
    pub(crate) fn refit_batch_output(&mut self, batch_node: SpatialId, output: SpatialId) -> Result<()> {
        let Some(state) = self.node_data_mut(batch_node)?.batch.as_mut() else {
            return Ok(());
        };
        let Some(batch) = state.batches.iter_mut().find(|b| b.output == output) else {
            return Ok(());
        };
        if !batch.dirty_bound {
            return Ok(());
        }
        batch.dirty_bound = false;
        if let Some(mesh) = self.geometry_data_mut(output)?.mesh.as_mut() {
            mesh.update_bound();
        }
        Ok(())
    }

    /// Update the world bounds of outputs whose members moved
    pub(crate) fn refresh_batch_bounds(&mut self, batch_node: SpatialId) -> Result<()> {
        let outputs: Vec<SpatialId> = self
            .node_data(batch_node)?
            .batch
            .iter()
            .flat_map(|state| state.batches.iter())
            .filter(|b| b.dirty_bound)
            .map(|b| b.output)
            .collect();
        for output in outputs {
            if self.spatials.contains(output) {
                self.refresh_world_transform(output)?;
                self.update_world_bound(output)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Structural changes
    // ========================================================================

    /// Nearest batch node at or above `id`
    pub fn enclosing_batch_node(&self, id: SpatialId) -> Option<SpatialId> {
        let mut current = Some(id);
        while let Some(c) = current {
            let spatial = self.spatials.get(c)?;
            if spatial.is_batch_node() {
                return Some(c);
            }
            current = spatial.parent;
        }
        None
    }

    /// Mark `batch_node` for a rebuild if it currently holds batches
    pub(crate) fn flag_rebatch(&mut self, batch_node: SpatialId) {
        let Some(state) = self
            .spatials
            .get_mut(batch_node)
            .and_then(Spatial::as_node_mut)
            .and_then(|n| n.batch.as_mut())
        else {
            return;
        };
        if !state.batches.is_empty() && !state.needs_full_rebatch {
            state.needs_full_rebatch = true;
            log::debug!("Batch node {:?} needs a full rebatch", batch_node);
        }
    }

    pub(crate) fn flag_rebatch_above(&mut self, id: SpatialId) {
        if let Some(batch_node) = self.enclosing_batch_node(id) {
            self.flag_rebatch(batch_node);
        }
    }

    /// Forget batch records made invalid by detaching `child` from `former_parent`
    ///
    /// Records pointing at batch nodes inside the detached subtree stay valid.
    pub(crate) fn release_batch_members(&mut self, former_parent: SpatialId, child: SpatialId) {
        let subtree = self.subtree(child);
        let mut flagged = Vec::new();
        for &id in &subtree {
            let Some(geometry) = self.spatials.get_mut(id).and_then(Spatial::as_geometry_mut) else {
                continue;
            };
            let Some(record) = geometry.batch else {
                continue;
            };
            if subtree.contains(&record.batch_node) {
                continue;
            }
            geometry.batch = None;
            if !flagged.contains(&record.batch_node) {
                flagged.push(record.batch_node);
            }
        }

        for batch_node in flagged {
            if let Some(state) = self
                .spatials
                .get_mut(batch_node)
                .and_then(Spatial::as_node_mut)
                .and_then(|n| n.batch.as_mut())
            {
                for batch in &mut state.batches {
                    batch.members.retain(|m| !subtree.contains(m));
                }
            }
            self.flag_rebatch(batch_node);
        }
        self.flag_rebatch_above(former_parent);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Slice of a batched geometry as (start vertex, vertex count)
    pub fn batch_info(&self, member: SpatialId) -> Result<Option<(usize, usize)>> {
        Ok(self
            .geometry_data(member)?
            .batch
            .map(|r| (r.start_index, r.vertex_count)))
    }

    pub fn batched_geometry(&self, member: SpatialId) -> Result<Option<&BatchedGeometry>> {
        Ok(self.geometry_data(member)?.batch.as_ref())
    }

    fn batch_state(&self, batch_node: SpatialId) -> Result<&BatchState> {
        self.node_data(batch_node)?
            .batch
            .as_ref()
            .ok_or(SceneError::NotABatchNode(batch_node))
    }

    pub fn batch_count(&self, batch_node: SpatialId) -> Result<usize> {
        Ok(self.batch_state(batch_node)?.batches.len())
    }

    /// Whether structure changed since the last [`Scene::batch`]
    pub fn needs_full_rebatch(&self, batch_node: SpatialId) -> Result<bool> {
        Ok(self.batch_state(batch_node)?.needs_full_rebatch)
    }

    /// Output geometry merging the members that use `material`
    pub fn batch_for_material(&self, batch_node: SpatialId, material: &Rc<Material>) -> Result<Option<SpatialId>> {
        Ok(self
            .batch_state(batch_node)?
            .batches
            .iter()
            .find(|b| Rc::ptr_eq(&b.material, material))
            .map(|b| b.output))
    }

    /// Geometries holding the merged meshes, one per material
    pub fn batch_outputs(&self, batch_node: SpatialId) -> Result<Vec<SpatialId>> {
        Ok(self
            .batch_state(batch_node)?
            .batches
            .iter()
            .map(|b| b.output)
            .collect())
    }
}
