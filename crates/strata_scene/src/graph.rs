//! The scene arena
//!
//! [`Scene`] owns every spatial and is the only way to change structure,
//! transforms or refresh state. World transforms, world bounds and world
//! light lists are caches guarded by [`RefreshFlags`]:
//!
//! - changing a local transform marks the spatial and its subtree for a
//!   transform refresh and its ancestors for a bound refresh
//! - [`Scene::update_geometric_state`] recomputes transforms top-down, then
//!   bounds bottom-up, and leaves no flag set anywhere in the subtree
//! - world queries between updates ([`Scene::world_transform`],
//!   [`Scene::world_bound`]) refresh just the chain they need

use std::any::Any;
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use strata_core::HandleMap;
use strata_math::{BoundingVolume, Mat4, Quat, Ray, Transform, Vec3};

use crate::batch::BatchState;
use crate::collision::CollisionResults;
use crate::config::SceneConfig;
use crate::control::Control;
use crate::error::{Result, SceneError};
use crate::light::{Light, LightList};
use crate::material::Material;
use crate::mesh::Mesh;
use crate::spatial::{
    BatchHint, Bucket, CullHint, GeometryData, NodeData, RefreshFlags, ShadowMode, Spatial,
    SpatialId, SpatialKind, UserData,
};

/// How [`Scene::clone_spatial`] treats meshes and materials
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloneMode {
    /// Share vertex buffers (copied on first write) and materials
    Shallow,
    /// Copy vertex buffers, materials and lights
    Deep,
}

/// Visit order for [`Scene::depth_first_traversal`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DfsMode {
    /// Parents before children
    #[default]
    PreOrder,
    /// Children before parents
    PostOrder,
}

/// Arena of spatials forming one or more trees
#[derive(Debug)]
pub struct Scene {
    pub(crate) spatials: HandleMap<Spatial>,
    pub(crate) config: SceneConfig,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            spatials: HandleMap::with_capacity(config.initial_capacity),
            config,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Number of live spatials
    pub fn len(&self) -> usize {
        self.spatials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spatials.is_empty()
    }

    pub fn contains(&self, id: SpatialId) -> bool {
        self.spatials.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpatialId, &Spatial)> {
        self.spatials.iter()
    }

    // ========================================================================
    // Creation and access
    // ========================================================================

    /// Create a detached node
    pub fn create_node(&mut self, name: impl Into<String>) -> SpatialId {
        self.spatials.insert(Spatial::node(Some(name.into())))
    }

    /// Create a detached geometry, optionally without a mesh
    pub fn create_geometry(&mut self, name: impl Into<String>, mesh: impl Into<Option<Mesh>>) -> SpatialId {
        self.spatials
            .insert(Spatial::geometry(Some(name.into()), mesh.into()))
    }

    /// Create a detached node whose geometry can be merged with [`Scene::batch`]
    pub fn create_batch_node(&mut self, name: impl Into<String>) -> SpatialId {
        let mut spatial = Spatial::node(Some(name.into()));
        if let Some(node) = spatial.as_node_mut() {
            node.batch = Some(BatchState::default());
        }
        self.spatials.insert(spatial)
    }

    pub fn get(&self, id: SpatialId) -> Result<&Spatial> {
        self.spatials.get(id).ok_or(SceneError::StaleHandle(id))
    }

    pub(crate) fn get_mut(&mut self, id: SpatialId) -> Result<&mut Spatial> {
        self.spatials.get_mut(id).ok_or(SceneError::StaleHandle(id))
    }

    pub(crate) fn node_data(&self, id: SpatialId) -> Result<&NodeData> {
        self.get(id)?.as_node().ok_or(SceneError::NotANode(id))
    }

    pub(crate) fn node_data_mut(&mut self, id: SpatialId) -> Result<&mut NodeData> {
        self.get_mut(id)?
            .as_node_mut()
            .ok_or(SceneError::NotANode(id))
    }

    pub(crate) fn geometry_data(&self, id: SpatialId) -> Result<&GeometryData> {
        self.get(id)?.as_geometry().ok_or(SceneError::NotAGeometry(id))
    }

    pub(crate) fn geometry_data_mut(&mut self, id: SpatialId) -> Result<&mut GeometryData> {
        self.get_mut(id)?
            .as_geometry_mut()
            .ok_or(SceneError::NotAGeometry(id))
    }

    pub fn set_name(&mut self, id: SpatialId, name: Option<String>) -> Result<()> {
        self.get_mut(id)?.name = name;
        Ok(())
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    pub fn children(&self, id: SpatialId) -> Result<&[SpatialId]> {
        Ok(&self.node_data(id)?.children)
    }

    pub fn child_at(&self, id: SpatialId, index: usize) -> Result<SpatialId> {
        let children = self.children(id)?;
        children
            .get(index)
            .copied()
            .ok_or(SceneError::ChildIndexOutOfBounds {
                index,
                len: children.len(),
            })
    }

    /// Append `child` to `parent`, detaching it from its previous parent
    ///
    /// Returns the new child count. Attaching to the current parent is a
    /// no-op.
    pub fn attach_child(&mut self, parent: SpatialId, child: SpatialId) -> Result<usize> {
        let len = self.node_data(parent)?.children.len();
        if self.get(child)?.parent == Some(parent) {
            return Ok(len);
        }
        self.attach_child_at(parent, child, len)
    }

    /// Insert `child` at `index` of `parent`'s children
    pub fn attach_child_at(&mut self, parent: SpatialId, child: SpatialId, index: usize) -> Result<usize> {
        let len = self.node_data(parent)?.children.len();
        let old_parent = self.get(child)?.parent;
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(SceneError::CyclicAttach { parent, child });
        }

        // Step 1: bounds check against the list as it will be after removal
        let len = if old_parent == Some(parent) { len - 1 } else { len };
        if index > len {
            return Err(SceneError::ChildIndexOutOfBounds { index, len });
        }

        // Step 2: leave the previous parent
        if let Some(old) = old_parent {
            self.detach_child(old, child)?;
        }

        // Step 3: insert and link
        self.node_data_mut(parent)?.children.insert(index, child);
        self.get_mut(child)?.parent = Some(parent);

        // Step 4: the child now inherits a different world
        self.set_transform_refresh(child)?;
        self.set_light_list_refresh(child)?;
        self.flag_rebatch_above(parent);

        log::trace!("Attached {:?} to {:?} at {}", child, parent, index);
        Ok(len + 1)
    }

    /// Detach `child` from `parent`; returns its former index
    pub fn detach_child(&mut self, parent: SpatialId, child: SpatialId) -> Result<Option<usize>> {
        let index = self
            .node_data(parent)?
            .children
            .iter()
            .position(|&c| c == child);
        if let Some(i) = index {
            self.detach_child_at(parent, i)?;
        }
        Ok(index)
    }

    /// Detach the child at `index`
    ///
    /// The child keeps its last world transform until it is attached and
    /// refreshed again.
    pub fn detach_child_at(&mut self, parent: SpatialId, index: usize) -> Result<SpatialId> {
        let node = self.node_data_mut(parent)?;
        if index >= node.children.len() {
            return Err(SceneError::ChildIndexOutOfBounds {
                index,
                len: node.children.len(),
            });
        }
        let child = node.children.remove(index);

        if let Some(spatial) = self.spatials.get_mut(child) {
            spatial.parent = None;
        }
        self.set_bound_refresh(parent)?;
        self.set_light_list_refresh(child)?;
        self.release_batch_members(parent, child);

        log::trace!("Detached {:?} from {:?}", child, parent);
        Ok(child)
    }

    /// Detach every child; returns them in their former order
    pub fn detach_all_children(&mut self, parent: SpatialId) -> Result<Vec<SpatialId>> {
        let count = self.node_data(parent)?.children.len();
        let mut detached = Vec::with_capacity(count);
        for index in (0..count).rev() {
            detached.push(self.detach_child_at(parent, index)?);
        }
        detached.reverse();
        Ok(detached)
    }

    /// Detach from the parent, if any
    pub fn remove_from_parent(&mut self, id: SpatialId) -> Result<bool> {
        match self.get(id)?.parent {
            Some(parent) => Ok(self.detach_child(parent, id)?.is_some()),
            None => Ok(false),
        }
    }

    /// Detach `id` and delete it with all descendants; returns the count
    pub fn remove_subtree(&mut self, id: SpatialId) -> Result<usize> {
        self.remove_from_parent(id)?;
        let doomed = self.subtree(id);
        for &spatial in &doomed {
            self.spatials.remove(spatial);
        }
        log::trace!("Removed {} spatials under {:?}", doomed.len(), id);
        Ok(doomed.len())
    }

    /// Direct child named `name`
    pub fn child_by_name(&self, parent: SpatialId, name: &str) -> Result<Option<SpatialId>> {
        Ok(self
            .children(parent)?
            .iter()
            .copied()
            .find(|&c| self.spatials.get(c).and_then(Spatial::name) == Some(name)))
    }

    /// First descendant named `name`, depth first
    pub fn find_descendant(&self, root: SpatialId, name: &str) -> Result<Option<SpatialId>> {
        self.get(root)?;
        Ok(self
            .subtree(root)
            .into_iter()
            .skip(1)
            .find(|&id| self.spatials.get(id).and_then(Spatial::name) == Some(name)))
    }

    /// Whether `descendant` is anywhere below `ancestor`
    pub fn has_descendant(&self, ancestor: SpatialId, descendant: SpatialId) -> Result<bool> {
        self.get(ancestor)?;
        self.get(descendant)?;
        Ok(self.is_ancestor_of(ancestor, descendant))
    }

    pub(crate) fn is_ancestor_of(&self, ancestor: SpatialId, id: SpatialId) -> bool {
        let mut current = self.spatials.get(id).and_then(|s| s.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.spatials.get(p).and_then(|s| s.parent);
        }
        false
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// `root` and all its descendants, parents first
    pub(crate) fn subtree(&self, root: SpatialId) -> Vec<SpatialId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(spatial) = self.spatials.get(id) else {
                continue;
            };
            out.push(id);
            stack.extend(spatial.children().iter().rev().copied());
        }
        out
    }

    /// `root` and all its descendants, parents first
    pub fn descendants(&self, root: SpatialId) -> Result<Vec<SpatialId>> {
        self.get(root)?;
        Ok(self.subtree(root))
    }

    pub fn depth_first_traversal<F>(&self, root: SpatialId, mode: DfsMode, mut visit: F) -> Result<()>
    where
        F: FnMut(SpatialId, &Spatial),
    {
        self.get(root)?;
        match mode {
            DfsMode::PreOrder => {
                for id in self.subtree(root) {
                    if let Some(spatial) = self.spatials.get(id) {
                        visit(id, spatial);
                    }
                }
            }
            DfsMode::PostOrder => self.visit_post_order(root, &mut visit),
        }
        Ok(())
    }

    fn visit_post_order<F>(&self, id: SpatialId, visit: &mut F)
    where
        F: FnMut(SpatialId, &Spatial),
    {
        let Some(spatial) = self.spatials.get(id) else {
            return;
        };
        for &child in spatial.children() {
            self.visit_post_order(child, visit);
        }
        visit(id, spatial);
    }

    pub fn breadth_first_traversal<F>(&self, root: SpatialId, mut visit: F) -> Result<()>
    where
        F: FnMut(SpatialId, &Spatial),
    {
        self.get(root)?;
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let Some(spatial) = self.spatials.get(id) else {
                continue;
            };
            visit(id, spatial);
            queue.extend(spatial.children().iter().copied());
        }
        Ok(())
    }

    // ========================================================================
    // Local transforms
    // ========================================================================

    fn modify_local(&mut self, id: SpatialId, f: impl FnOnce(&mut Transform)) -> Result<()> {
        f(&mut self.get_mut(id)?.local_transform);
        self.set_transform_refresh(id)
    }

    pub fn set_local_transform(&mut self, id: SpatialId, transform: Transform) -> Result<()> {
        self.modify_local(id, |t| *t = transform)
    }

    pub fn set_local_translation(&mut self, id: SpatialId, translation: Vec3) -> Result<()> {
        self.modify_local(id, |t| t.translation = translation)
    }

    pub fn set_local_rotation(&mut self, id: SpatialId, rotation: Quat) -> Result<()> {
        self.modify_local(id, |t| t.rotation = rotation)
    }

    pub fn set_local_scale(&mut self, id: SpatialId, scale: Vec3) -> Result<()> {
        self.modify_local(id, |t| t.scale = scale)
    }

    /// Translate by `offset` in parent space
    pub fn move_local(&mut self, id: SpatialId, offset: Vec3) -> Result<()> {
        self.modify_local(id, |t| t.translation += offset)
    }

    /// Apply `rotation` after the current local rotation
    pub fn rotate(&mut self, id: SpatialId, rotation: Quat) -> Result<()> {
        self.modify_local(id, |t| t.rotation = t.rotation * rotation)
    }

    /// Rotate by Euler angles in radians
    pub fn rotate_angles(&mut self, id: SpatialId, x: f32, y: f32, z: f32) -> Result<()> {
        self.rotate(id, Quat::from_angles(x, y, z))
    }

    /// Multiply the local scale component-wise
    pub fn scale_by(&mut self, id: SpatialId, factor: Vec3) -> Result<()> {
        self.modify_local(id, |t| t.scale = t.scale.mult(factor))
    }

    /// Turn so local +Z points at the world `position`
    ///
    /// The rotation is set as the local rotation; parent rotation is not
    /// compensated.
    pub fn look_at(&mut self, id: SpatialId, position: Vec3, up: Vec3) -> Result<()> {
        let eye = self.world_transform(id)?.translation;
        self.set_local_rotation(id, Quat::look_rotation(position - eye, up))
    }

    // ========================================================================
    // World queries
    // ========================================================================

    /// World transform, refreshing stale ancestors first
    pub fn world_transform(&mut self, id: SpatialId) -> Result<Transform> {
        self.refresh_world_transform(id)?;
        Ok(self.get(id)?.world_transform)
    }

    pub fn world_translation(&mut self, id: SpatialId) -> Result<Vec3> {
        Ok(self.world_transform(id)?.translation)
    }

    pub fn world_rotation(&mut self, id: SpatialId) -> Result<Quat> {
        Ok(self.world_transform(id)?.rotation)
    }

    pub fn world_scale(&mut self, id: SpatialId) -> Result<Vec3> {
        Ok(self.world_transform(id)?.scale)
    }

    /// Matrix placing the spatial's model space in the world
    ///
    /// Geometries that ignore transforms use the identity.
    pub fn world_matrix(&mut self, id: SpatialId) -> Result<Mat4> {
        let transform = self.world_transform(id)?;
        if self.get(id)?.ignores_transform() {
            Ok(Mat4::IDENTITY)
        } else {
            Ok(transform.to_matrix())
        }
    }

    /// Convert a point from the spatial's space to world space
    pub fn local_to_world(&mut self, id: SpatialId, point: Vec3) -> Result<Vec3> {
        Ok(self.world_transform(id)?.transform_vector(point))
    }

    /// Convert a world point into the spatial's space
    pub fn world_to_local(&mut self, id: SpatialId, point: Vec3) -> Result<Vec3> {
        Ok(self.world_transform(id)?.transform_inverse_vector(point))
    }

    /// World bound, refreshing what it depends on first
    pub fn world_bound(&mut self, id: SpatialId) -> Result<Option<BoundingVolume>> {
        self.check_do_bound_update(id)?;
        Ok(self.get(id)?.world_bound)
    }

    /// Update the world transforms of `id` and its stale ancestors only
    pub fn refresh_world_transform(&mut self, id: SpatialId) -> Result<()> {
        // Step 1: find the top-most ancestor with a stale transform
        let mut chain = Vec::new();
        let mut top = None;
        let mut current = Some(id);
        while let Some(c) = current {
            let spatial = self.get(c)?;
            chain.push(c);
            if spatial.refresh_flags.contains(RefreshFlags::TRANSFORM) {
                top = Some(chain.len() - 1);
            }
            current = spatial.parent;
        }

        // Step 2: update from there down to `id`
        let Some(top) = top else {
            return Ok(());
        };
        for &c in chain[..=top].iter().rev() {
            self.update_world_transform(c)?;
        }
        Ok(())
    }

    fn check_do_bound_update(&mut self, id: SpatialId) -> Result<()> {
        if !self.get(id)?.refresh_flags.contains(RefreshFlags::BOUND) {
            return Ok(());
        }
        self.refresh_world_transform(id)?;
        let mut i = 0;
        while let Some(child) = self.get(id)?.children().get(i).copied() {
            self.check_do_bound_update(child)?;
            i += 1;
        }
        if self.get(id)?.is_batch_node() {
            self.refresh_batch_bounds(id)?;
        }
        self.update_world_bound(id)
    }

    // ========================================================================
    // Refresh flags
    // ========================================================================

    /// Mark `id` and its subtree for a transform refresh and the ancestors
    /// for a bound refresh
    ///
    /// Children already marked are not descended into; their subtrees are
    /// marked from when they were.
    pub fn set_transform_refresh(&mut self, id: SpatialId) -> Result<()> {
        self.get(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(spatial) = self.spatials.get_mut(current) else {
                continue;
            };
            spatial
                .refresh_flags
                .insert(RefreshFlags::TRANSFORM | RefreshFlags::BOUND);
            let parent = spatial.parent;
            self.propagate_bound_up(parent);

            let spatials = &self.spatials;
            if let Some(spatial) = spatials.get(current) {
                stack.extend(spatial.children().iter().copied().filter(|&c| {
                    spatials
                        .get(c)
                        .is_some_and(|c| !c.refresh_flags.contains(RefreshFlags::TRANSFORM))
                }));
            }
        }
        Ok(())
    }

    /// Mark `id` and its ancestors for a bound refresh
    pub fn set_bound_refresh(&mut self, id: SpatialId) -> Result<()> {
        let spatial = self.get_mut(id)?;
        spatial.refresh_flags.insert(RefreshFlags::BOUND);
        let parent = spatial.parent;
        self.propagate_bound_up(parent);
        Ok(())
    }

    /// Mark `id` and its subtree for a light list refresh
    pub fn set_light_list_refresh(&mut self, id: SpatialId) -> Result<()> {
        self.get(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(spatial) = self.spatials.get_mut(current) else {
                continue;
            };
            spatial.refresh_flags.insert(RefreshFlags::LIGHT_LIST);

            let spatials = &self.spatials;
            if let Some(spatial) = spatials.get(current) {
                stack.extend(spatial.children().iter().copied().filter(|&c| {
                    spatials
                        .get(c)
                        .is_some_and(|c| !c.refresh_flags.contains(RefreshFlags::LIGHT_LIST))
                }));
            }
        }
        Ok(())
    }

    /// Set BOUND up the chain, stopping at the first ancestor that has it
    fn propagate_bound_up(&mut self, from: Option<SpatialId>) {
        let mut current = from;
        while let Some(p) = current {
            let Some(spatial) = self.spatials.get_mut(p) else {
                break;
            };
            if spatial.refresh_flags.contains(RefreshFlags::BOUND) {
                break;
            }
            spatial.refresh_flags.insert(RefreshFlags::BOUND);
            current = spatial.parent;
        }
    }

    // ========================================================================
    // Geometric update
    // ========================================================================

    /// Bring world transforms, bounds and light lists of the subtree up to date
    pub fn update_geometric_state(&mut self, root: SpatialId) -> Result<()> {
        self.update_geometric_recursive(root)?;

        if cfg!(debug_assertions) || self.config.verify_refresh_flags {
            let leftover = self.first_dirty(root);
            debug_assert!(
                leftover.is_none(),
                "refresh flags remain after update: {:?}",
                leftover
            );
            if let Some((id, flags)) = leftover {
                return Err(SceneError::RefreshFlagsRemain {
                    id,
                    flags: format!("{:?}", flags),
                });
            }
        }
        Ok(())
    }

    fn update_geometric_recursive(&mut self, id: SpatialId) -> Result<()> {
        let flags = self.get(id)?.refresh_flags;
        if flags.contains(RefreshFlags::LIGHT_LIST) {
            self.update_world_light_list(id)?;
        }
        if flags.contains(RefreshFlags::TRANSFORM) {
            self.update_world_transform(id)?;
        }

        let mut i = 0;
        while let Some(child) = self.get(id)?.children().get(i).copied() {
            self.update_geometric_recursive(child)?;
            i += 1;
        }

        // Merged meshes moved by members must be refit before the merge
        if self.get(id)?.is_batch_node() {
            self.refresh_batch_bounds(id)?;
        }
        if self.get(id)?.refresh_flags.contains(RefreshFlags::BOUND) {
            self.update_world_bound(id)?;
        }
        Ok(())
    }

    /// First spatial in the subtree that still has a flag set
    pub(crate) fn first_dirty(&self, root: SpatialId) -> Option<(SpatialId, RefreshFlags)> {
        self.subtree(root).into_iter().find_map(|id| {
            let flags = self.spatials.get(id)?.refresh_flags;
            (!flags.is_empty()).then_some((id, flags))
        })
    }

    /// Combine the local transform with the parent's world transform
    pub(crate) fn update_world_transform(&mut self, id: SpatialId) -> Result<()> {
        let parent_world = self
            .get(id)?
            .parent
            .and_then(|p| self.spatials.get(p))
            .map(|p| p.world_transform);

        let spatial = self.get_mut(id)?;
        spatial.world_transform = match parent_world {
            Some(parent) => spatial.local_transform.combine_with_parent(&parent),
            None => spatial.local_transform,
        };
        spatial.refresh_flags.remove(RefreshFlags::TRANSFORM);

        if spatial.is_batched() {
            self.update_sub_batch(id)?;
        }
        Ok(())
    }

    pub(crate) fn update_world_bound(&mut self, id: SpatialId) -> Result<()> {
        if let Some(batch_node) = self.get(id)?.as_geometry().and_then(|g| g.batch_output_of) {
            self.refit_batch_output(batch_node, id)?;
        }

        let spatial = self.get(id)?;
        let bound = match &spatial.kind {
            SpatialKind::Node(node) => node
                .children
                .iter()
                .filter_map(|&c| self.spatials.get(c).and_then(|c| c.world_bound))
                .reduce(|acc, b| acc.merge(&b)),
            SpatialKind::Geometry(geometry) => {
                let mesh = geometry
                    .mesh
                    .as_ref()
                    .ok_or_else(|| SceneError::MissingMesh(spatial.display_name()))?;
                Some(if geometry.ignore_transform {
                    *mesh.bound()
                } else {
                    mesh.bound().transform(&spatial.world_transform)
                })
            }
        };

        let spatial = self.get_mut(id)?;
        spatial.world_bound = bound;
        spatial.refresh_flags.remove(RefreshFlags::BOUND);
        Ok(())
    }

    fn update_world_light_list(&mut self, id: SpatialId) -> Result<()> {
        let spatial = self.get(id)?;
        let parent = spatial.parent.and_then(|p| self.spatials.get(p));
        let world = LightList::compose(&spatial.local_lights, parent.map(|p| &p.world_lights));

        let spatial = self.get_mut(id)?;
        spatial.world_lights = world;
        spatial.refresh_flags.remove(RefreshFlags::LIGHT_LIST);
        Ok(())
    }

    // ========================================================================
    // Logical update and controls
    // ========================================================================

    /// Run every enabled control in the subtree, parents first
    pub fn update_logical_state(&mut self, root: SpatialId, tpf: f32) -> Result<()> {
        self.run_controls(root, tpf)?;
        // Controls may restructure the tree; walk a snapshot
        let children = match self.spatials.get(root) {
            Some(spatial) => spatial.children().to_vec(),
            None => return Ok(()),
        };
        for child in children {
            if self.spatials.contains(child) {
                self.update_logical_state(child, tpf)?;
            }
        }
        Ok(())
    }

    fn run_controls(&mut self, id: SpatialId, tpf: f32) -> Result<()> {
        let mut controls = mem::take(&mut self.get_mut(id)?.controls);
        let mut result = Ok(());
        for control in controls.iter_mut() {
            if control.is_enabled() {
                result = control.update(self, id, tpf);
                if result.is_err() {
                    break;
                }
            }
        }

        // Keep controls added while running, after the existing ones
        if let Some(spatial) = self.spatials.get_mut(id) {
            controls.append(&mut spatial.controls);
            spatial.controls = controls;
        }
        result
    }

    pub fn add_control(&mut self, id: SpatialId, control: Box<dyn Control>) -> Result<()> {
        self.get_mut(id)?.controls.push(control);
        Ok(())
    }

    pub fn remove_control_at(&mut self, id: SpatialId, index: usize) -> Result<Option<Box<dyn Control>>> {
        let controls = &mut self.get_mut(id)?.controls;
        Ok((index < controls.len()).then(|| controls.remove(index)))
    }

    /// Remove the first control of type `T`
    pub fn remove_control<T: Any>(&mut self, id: SpatialId) -> Result<Option<Box<dyn Control>>> {
        let controls = &mut self.get_mut(id)?.controls;
        match controls.iter().position(|c| c.as_any().is::<T>()) {
            Some(index) => Ok(Some(controls.remove(index))),
            None => {
                log::warn!(
                    "No {} control attached to {:?}",
                    std::any::type_name::<T>(),
                    id
                );
                Ok(None)
            }
        }
    }

    /// First control of type `T`
    ///
    /// Controls are not visible here while their own update runs.
    pub fn control<T: Any>(&self, id: SpatialId) -> Result<Option<&T>> {
        Ok(self
            .get(id)?
            .controls
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<T>()))
    }

    pub fn control_mut<T: Any>(&mut self, id: SpatialId) -> Result<Option<&mut T>> {
        Ok(self
            .get_mut(id)?
            .controls
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<T>()))
    }

    // ========================================================================
    // Lights and user data
    // ========================================================================

    pub fn add_light(&mut self, id: SpatialId, light: Rc<Light>) -> Result<()> {
        self.get_mut(id)?.local_lights.add(light);
        self.set_light_list_refresh(id)
    }

    pub fn remove_light(&mut self, id: SpatialId, light: &Rc<Light>) -> Result<bool> {
        let removed = self.get_mut(id)?.local_lights.remove(light);
        if removed {
            self.set_light_list_refresh(id)?;
        }
        Ok(removed)
    }

    /// Set or, with `None`, remove a user data entry; returns the old value
    pub fn set_user_data(
        &mut self,
        id: SpatialId,
        key: impl Into<String>,
        value: Option<UserData>,
    ) -> Result<Option<UserData>> {
        let key = key.into();
        let data = &mut self.get_mut(id)?.user_data;
        Ok(match value {
            Some(value) => data.insert(key, value),
            None => data.remove(&key),
        })
    }

    pub fn user_data(&self, id: SpatialId, key: &str) -> Result<Option<&UserData>> {
        Ok(self.get(id)?.user_data(key))
    }

    // ========================================================================
    // Hints
    // ========================================================================

    /// Walk up until a spatial sets the hint
    fn effective_hint<H: Copy + PartialEq>(
        &self,
        id: SpatialId,
        local: impl Fn(&Spatial) -> H,
        inherit: H,
        root: H,
    ) -> Result<H> {
        let mut current = Some(id);
        while let Some(c) = current {
            let spatial = self.get(c)?;
            let hint = local(spatial);
            if hint != inherit {
                return Ok(hint);
            }
            current = spatial.parent;
        }
        Ok(root)
    }

    pub fn set_cull_hint(&mut self, id: SpatialId, hint: CullHint) -> Result<()> {
        self.get_mut(id)?.cull_hint = hint;
        Ok(())
    }

    pub fn cull_hint(&self, id: SpatialId) -> Result<CullHint> {
        self.effective_hint(id, |s| s.cull_hint, CullHint::Inherit, CullHint::ROOT)
    }

    /// Batched geometries whose membership may change are flagged for a rebatch
    pub fn set_batch_hint(&mut self, id: SpatialId, hint: BatchHint) -> Result<()> {
        let spatial = self.get_mut(id)?;
        if spatial.batch_hint == hint {
            return Ok(());
        }
        spatial.batch_hint = hint;
        self.flag_batched_in(id);
        Ok(())
    }

    pub fn batch_hint(&self, id: SpatialId) -> Result<BatchHint> {
        self.effective_hint(id, |s| s.batch_hint, BatchHint::Inherit, BatchHint::ROOT)
    }

    pub fn set_queue_bucket(&mut self, id: SpatialId, bucket: Bucket) -> Result<()> {
        self.get_mut(id)?.queue_bucket = bucket;
        Ok(())
    }

    pub fn queue_bucket(&self, id: SpatialId) -> Result<Bucket> {
        self.effective_hint(id, |s| s.queue_bucket, Bucket::Inherit, Bucket::ROOT)
    }

    pub fn set_shadow_mode(&mut self, id: SpatialId, mode: ShadowMode) -> Result<()> {
        self.get_mut(id)?.shadow_mode = mode;
        Ok(())
    }

    pub fn shadow_mode(&self, id: SpatialId) -> Result<ShadowMode> {
        self.effective_hint(id, |s| s.shadow_mode, ShadowMode::Inherit, ShadowMode::ROOT)
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    /// Replace a geometry's mesh
    ///
    /// Batched geometries keep their mesh until unbatched.
    pub fn set_mesh(&mut self, id: SpatialId, mesh: Mesh) -> Result<()> {
        let name = self.get(id)?.display_name();
        let geometry = self.geometry_data_mut(id)?;
        if geometry.batch.is_some() {
            return Err(SceneError::Unsupported(format!(
                "cannot set the mesh of batched geometry '{}'",
                name
            )));
        }
        geometry.mesh = Some(mesh);
        self.set_bound_refresh(id)
    }

    pub fn mesh(&self, id: SpatialId) -> Result<Option<&Mesh>> {
        Ok(self.geometry_data(id)?.mesh.as_ref())
    }

    /// Mutable mesh access; refused while the geometry is batched
    pub fn mesh_mut(&mut self, id: SpatialId) -> Result<Option<&mut Mesh>> {
        let name = self.get(id)?.display_name();
        let geometry = self.geometry_data_mut(id)?;
        if geometry.batch.is_some() {
            return Err(SceneError::Unsupported(format!(
                "mesh of batched geometry '{}' is read-only",
                name
            )));
        }
        Ok(geometry.mesh.as_mut())
    }

    /// Refit the model bound of every mesh in the subtree
    pub fn update_model_bound(&mut self, id: SpatialId) -> Result<()> {
        self.get(id)?;
        for spatial in self.subtree(id) {
            let Some(geometry) = self.spatials.get_mut(spatial).and_then(Spatial::as_geometry_mut) else {
                continue;
            };
            if let Some(mesh) = geometry.mesh.as_mut() {
                mesh.update_bound();
                self.set_bound_refresh(spatial)?;
            }
        }
        Ok(())
    }

    /// Set the material of a geometry, or of every geometry below a node
    ///
    /// Changing the material of a batch member flags its batch for a
    /// rebuild.
    pub fn set_material(&mut self, id: SpatialId, material: Rc<Material>) -> Result<()> {
        self.get(id)?;
        let mut rebatch = Vec::new();
        for spatial in self.subtree(id) {
            let Some(geometry) = self.spatials.get_mut(spatial).and_then(Spatial::as_geometry_mut) else {
                continue;
            };
            let changed = !geometry
                .material
                .as_ref()
                .is_some_and(|m| Rc::ptr_eq(m, &material));
            if changed {
                if let Some(record) = &geometry.batch {
                    rebatch.push(record.batch_node);
                }
            }
            geometry.material = Some(Rc::clone(&material));
        }
        for batch_node in rebatch {
            self.flag_rebatch(batch_node);
        }
        Ok(())
    }

    pub fn material(&self, id: SpatialId) -> Result<Option<Rc<Material>>> {
        Ok(self.geometry_data(id)?.material.clone())
    }

    /// Draw the mesh in world space as-is, ignoring the world transform
    pub fn set_ignore_transform(&mut self, id: SpatialId, ignore: bool) -> Result<()> {
        let geometry = self.geometry_data_mut(id)?;
        let changed = geometry.ignore_transform != ignore;
        geometry.ignore_transform = ignore;
        if changed {
            self.flag_batched_in(id);
        }
        self.set_bound_refresh(id)
    }

    /// Flag the batch nodes of every batched geometry under `id`
    fn flag_batched_in(&mut self, id: SpatialId) {
        let batch_nodes: Vec<SpatialId> = self
            .subtree(id)
            .into_iter()
            .filter_map(|s| self.spatials.get(s).and_then(Spatial::as_geometry))
            .filter_map(|g| g.batch.map(|record| record.batch_node))
            .collect();
        for batch_node in batch_nodes {
            self.flag_rebatch(batch_node);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Collide a world-space ray with every geometry in the subtree
    ///
    /// Uses world state as of the last update. Merged batch meshes are
    /// skipped so contacts name the member geometries. Returns the number
    /// of contacts added.
    pub fn collide_with(&self, root: SpatialId, ray: &Ray, results: &mut CollisionResults) -> Result<usize> {
        self.get(root)?;
        let mut added = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(spatial) = self.spatials.get(id) else {
                continue;
            };
            if let Some(bound) = &spatial.world_bound {
                if !bound.intersects_ray(ray) {
                    continue;
                }
            }
            match &spatial.kind {
                SpatialKind::Node(node) => stack.extend(node.children.iter().rev().copied()),
                SpatialKind::Geometry(geometry) => {
                    if geometry.batch_output_of.is_some() {
                        continue;
                    }
                    let Some(mesh) = &geometry.mesh else {
                        continue;
                    };
                    let world = if geometry.ignore_transform {
                        Mat4::IDENTITY
                    } else {
                        spatial.world_transform.to_matrix()
                    };
                    let before = results.len();
                    added += mesh.collide_with(ray, &world, results);
                    results.tag_from(before, id);
                }
            }
        }
        Ok(added)
    }

    fn sum_over_meshes(&self, root: SpatialId, f: impl Fn(&Mesh) -> usize) -> Result<usize> {
        self.get(root)?;
        Ok(self
            .subtree(root)
            .into_iter()
            .filter_map(|id| self.spatials.get(id))
            .filter(|s| !s.is_batch_output())
            .filter_map(Spatial::mesh)
            .map(f)
            .sum())
    }

    /// Triangles drawn by the subtree, not counting merged batch meshes
    pub fn triangle_count(&self, root: SpatialId) -> Result<usize> {
        self.sum_over_meshes(root, Mesh::triangle_count)
    }

    /// Vertices in the subtree, not counting merged batch meshes
    pub fn vertex_count(&self, root: SpatialId) -> Result<usize> {
        self.sum_over_meshes(root, Mesh::vertex_count)
    }

    // ========================================================================
    // Cloning
    // ========================================================================

    /// Copy a subtree; the copy is detached
    ///
    /// Merged batch meshes are not copied. A copied batch node that was
    /// batched is flagged for a full rebatch.
    pub fn clone_spatial(&mut self, id: SpatialId, mode: CloneMode) -> Result<SpatialId> {
        let source = self.get(id)?;
        let kind = match &source.kind {
            SpatialKind::Node(node) => SpatialKind::Node(NodeData {
                children: Vec::new(),
                batch: node.batch.as_ref().map(BatchState::detached_copy),
            }),
            SpatialKind::Geometry(geometry) => SpatialKind::Geometry(GeometryData {
                mesh: geometry.mesh.as_ref().map(|m| match mode {
                    CloneMode::Shallow => m.shallow_clone(),
                    CloneMode::Deep => m.deep_clone(),
                }),
                material: geometry.material.as_ref().map(|m| match mode {
                    CloneMode::Shallow => Rc::clone(m),
                    CloneMode::Deep => Rc::new(Material::clone(m)),
                }),
                ignore_transform: geometry.ignore_transform,
                batch: None,
                batch_output_of: None,
            }),
        };

        let mut copy = Spatial::new(source.name.clone(), kind);
        copy.local_transform = source.local_transform;
        copy.world_transform = source.world_transform;
        copy.world_bound = source.world_bound;
        copy.local_lights = match mode {
            CloneMode::Shallow => source.local_lights.clone(),
            CloneMode::Deep => source.local_lights.deep_clone(),
        };
        copy.controls = source
            .controls
            .iter()
            .filter_map(|c| c.clone_for_spatial())
            .collect();
        copy.cull_hint = source.cull_hint;
        copy.batch_hint = source.batch_hint;
        copy.queue_bucket = source.queue_bucket;
        copy.shadow_mode = source.shadow_mode;
        copy.user_data = source.user_data.clone();

        let children: Vec<SpatialId> = source
            .children()
            .iter()
            .copied()
            .filter(|&c| !self.spatials.get(c).is_some_and(Spatial::is_batch_output))
            .collect();

        let copy_id = self.spatials.insert(copy);
        for child in children {
            let child_copy = self.clone_spatial(child, mode)?;
            self.node_data_mut(copy_id)?.children.push(child_copy);
            self.get_mut(child_copy)?.parent = Some(copy_id);
        }
        Ok(copy_id)
    }
}
