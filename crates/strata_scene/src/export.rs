//! Capsule persistence of whole subtrees
//!
//! [`Scene::export`] writes a spatial and its descendants into a
//! [`MemoryCapsule`]; [`SceneImporter`] rebuilds them in a scene. Merged
//! batch meshes are not written; an imported batch node is flagged for a
//! full rebatch instead.

use std::collections::HashMap;
use std::rc::Rc;

use strata_core::{CapsuleError, InputCapsule, MemoryCapsule, OutputCapsule, Savable};
use strata_math::Transform;

use crate::batch::BatchState;
use crate::control::{Control, ControlReader};
use crate::error::Result;
use crate::graph::Scene;
use crate::light::LightList;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::spatial::{
    BatchHint, Bucket, CullHint, GeometryData, NodeData, ShadowMode, Spatial, SpatialId, SpatialKind,
    UserData,
};

const NODE_CLASS: &str = "Node";
const BATCH_NODE_CLASS: &str = "BatchNode";
const GEOMETRY_CLASS: &str = "Geometry";

/// Writes one spatial of a scene, children included
struct SpatialWriter<'a> {
    scene: &'a Scene,
    id: SpatialId,
}

/// Writes a control through [`Control::save`]
struct ControlWriter<'a>(&'a dyn Control);

impl Savable for ControlWriter<'_> {
    fn write(&self, out: &mut dyn OutputCapsule) {
        self.0.save(out);
    }

    fn read(_input: &dyn InputCapsule) -> strata_core::Result<Self> {
        Err(CapsuleError::InvalidValue {
            field: "controlsList".into(),
            reason: "controls are read through SceneImporter".into(),
        })
    }
}

impl Savable for SpatialWriter<'_> {
    fn write(&self, out: &mut dyn OutputCapsule) {
        let Some(spatial) = self.scene.spatials.get(self.id) else {
            return;
        };
        let class = match &spatial.kind {
            SpatialKind::Node(node) if node.batch.is_some() => BATCH_NODE_CLASS,
            SpatialKind::Node(_) => NODE_CLASS,
            SpatialKind::Geometry(_) => GEOMETRY_CLASS,
        };
        out.set_class(class);

        out.write_string("name", spatial.name(), None);
        out.write_string("cull_mode", Some(spatial.cull_hint.name()), Some(CullHint::Inherit.name()));
        out.write_string("batch_hint", Some(spatial.batch_hint.name()), Some(BatchHint::Inherit.name()));
        out.write_string("queue", Some(spatial.queue_bucket.name()), Some(Bucket::Inherit.name()));
        out.write_string(
            "shadow_mode",
            Some(spatial.shadow_mode.name()),
            Some(ShadowMode::Inherit.name()),
        );
        strata_core::write_savable_or_skip(out, "transform", &spatial.local_transform, &Transform::IDENTITY);
        if !spatial.local_lights.is_empty() {
            out.write_savable("lights", Some(&spatial.local_lights));
        }

        let user_data: Vec<(&str, &dyn Savable)> = spatial
            .user_data
            .iter()
            .map(|(k, v)| (k.as_str(), v as &dyn Savable))
            .collect();
        out.write_savable_map("user_data", &user_data);

        // Only controls that know how to persist themselves are written
        let controls: Vec<ControlWriter> = spatial
            .controls
            .iter()
            .filter(|c| c.save(&mut MemoryCapsule::new()))
            .map(|c| ControlWriter(&**c))
            .collect();
        let controls: Vec<&dyn Savable> = controls.iter().map(|c| c as &dyn Savable).collect();
        out.write_savable_list("controlsList", &controls);

        match &spatial.kind {
            SpatialKind::Node(node) => {
                let children: Vec<SpatialWriter> = node
                    .children
                    .iter()
                    .filter(|&&c| self.scene.spatials.get(c).is_some_and(|s| !s.is_batch_output()))
                    .map(|&id| SpatialWriter { scene: self.scene, id })
                    .collect();
                let children: Vec<&dyn Savable> = children.iter().map(|c| c as &dyn Savable).collect();
                out.write_savable_list("children", &children);
            }
            SpatialKind::Geometry(geometry) => {
                if let Some(mesh) = &geometry.mesh {
                    out.write_savable("mesh", Some(mesh));
                }
                if let Some(material) = &geometry.material {
                    out.write_savable("material", Some(&**material));
                    out.write_string("materialName", material.name(), None);
                }
                out.write_bool("ignoreTransform", geometry.ignore_transform, false);
            }
        }
    }

    fn read(_input: &dyn InputCapsule) -> strata_core::Result<Self> {
        Err(CapsuleError::InvalidValue {
            field: "class".into(),
            reason: "spatials are read through SceneImporter".into(),
        })
    }
}

impl Scene {
    /// Write `id` and its descendants into a capsule
    pub fn export(&self, id: SpatialId) -> Result<MemoryCapsule> {
        self.get(id)?;
        Ok(MemoryCapsule::from_savable(&SpatialWriter { scene: self, id }))
    }
}

fn read_hint<H>(input: &dyn InputCapsule, field: &str, parse: fn(&str) -> Option<H>) -> strata_core::Result<H>
where
    H: Default,
{
    match input.read_string(field, None)? {
        None => Ok(H::default()),
        Some(name) => parse(&name).ok_or_else(|| CapsuleError::InvalidValue {
            field: field.into(),
            reason: format!("unknown hint {}", name),
        }),
    }
}

/// Rebuilds exported subtrees
///
/// Named materials are shared: every geometry naming a material already
/// seen, or registered up front, gets the same instance.
#[derive(Default)]
pub struct SceneImporter {
    materials: HashMap<String, Rc<Material>>,
    control_readers: HashMap<String, ControlReader>,
}

impl SceneImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve geometries naming `material` to this instance
    pub fn register_material(&mut self, material: Rc<Material>) -> bool {
        match material.name() {
            Some(name) => {
                self.materials.insert(name.to_string(), material);
                true
            }
            None => false,
        }
    }

    /// Reader for controls written with class `type_name`
    pub fn register_control(&mut self, type_name: impl Into<String>, reader: ControlReader) {
        self.control_readers.insert(type_name.into(), reader);
    }

    /// Rebuild a subtree written by [`Scene::export`]; the root is detached
    pub fn import(&mut self, scene: &mut Scene, input: &dyn InputCapsule) -> Result<SpatialId> {
        let class = input.class_name().unwrap_or(NODE_CLASS);
        let kind = match class {
            NODE_CLASS => SpatialKind::Node(NodeData::default()),
            BATCH_NODE_CLASS => SpatialKind::Node(NodeData {
                children: Vec::new(),
                batch: Some(BatchState {
                    batches: Vec::new(),
                    needs_full_rebatch: true,
                }),
            }),
            GEOMETRY_CLASS => SpatialKind::Geometry(self.read_geometry(input)?),
            other => {
                return Err(CapsuleError::InvalidValue {
                    field: "class".into(),
                    reason: format!("not a spatial: {}", other),
                }
                .into())
            }
        };

        // Step 1: fields common to every spatial
        let mut spatial = Spatial::new(input.read_string("name", None)?, kind);
        spatial.cull_hint = read_hint(input, "cull_mode", CullHint::from_name)?;
        spatial.batch_hint = read_hint(input, "batch_hint", BatchHint::from_name)?;
        spatial.queue_bucket = read_hint(input, "queue", Bucket::from_name)?;
        spatial.shadow_mode = read_hint(input, "shadow_mode", ShadowMode::from_name)?;
        spatial.local_transform = strata_core::read_savable_or(input, "transform", Transform::IDENTITY)?;
        spatial.local_lights = strata_core::read_savable_or(input, "lights", LightList::new())?;
        for (key, value) in input.read_child_map("user_data")? {
            spatial.user_data.insert(key.to_string(), UserData::read(value)?);
        }
        for control in input.read_child_list("controlsList")? {
            let type_name = control.class_name().unwrap_or_default();
            match self.control_readers.get(type_name) {
                Some(reader) => spatial.controls.push(reader(control)?),
                None => log::warn!("Skipping control of unregistered type '{}'", type_name),
            }
        }
        let id = scene.spatials.insert(spatial);

        // Step 2: children
        for child in input.read_child_list("children")? {
            let child = self.import(scene, child)?;
            scene.attach_child(id, child)?;
        }
        Ok(id)
    }

    fn read_geometry(&mut self, input: &dyn InputCapsule) -> Result<GeometryData> {
        let mesh = strata_core::read_savable::<Mesh>(input, "mesh")?;

        let name = input.read_string("materialName", None)?;
        let material = match name.as_deref().and_then(|n| self.materials.get(n)) {
            Some(shared) => Some(Rc::clone(shared)),
            None => match strata_core::read_savable::<Material>(input, "material")? {
                Some(material) => {
                    let material = material.into_shared();
                    self.register_material(Rc::clone(&material));
                    Some(material)
                }
                None => None,
            },
        };

        Ok(GeometryData {
            mesh,
            material,
            ignore_transform: input.read_bool("ignoreTransform", false)?,
            batch: None,
            batch_output_of: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RotationControl;
    use crate::error::SceneError;
    use strata_math::Vec3;

    #[test]
    fn test_unknown_class_is_rejected() {
        let mut capsule = MemoryCapsule::new();
        capsule.set_class("AssetLinkNode");
        let mut scene = Scene::new();
        assert!(matches!(
            SceneImporter::new().import(&mut scene, &capsule),
            Err(SceneError::Capsule(CapsuleError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_defaults_are_not_written() {
        let mut scene = Scene::new();
        let node = scene.create_node("plain");
        let capsule = scene.export(node).unwrap();
        let fields: Vec<&str> = capsule.field_names().collect();
        assert_eq!(fields, vec!["name"]);
        assert_eq!(capsule.class_name(), Some(NODE_CLASS));
    }

    #[test]
    fn test_unregistered_controls_are_skipped() {
        let mut scene = Scene::new();
        let node = scene.create_node("spinner");
        scene
            .add_control(node, Box::new(RotationControl::new(Vec3::Y)))
            .unwrap();
        let capsule = scene.export(node).unwrap();

        let copy = SceneImporter::new().import(&mut scene, &capsule).unwrap();
        assert_eq!(scene.get(copy).unwrap().control_count(), 0);

        let mut importer = SceneImporter::new();
        importer.register_control(RotationControl::TYPE_NAME, RotationControl::reader);
        let copy = importer.import(&mut scene, &capsule).unwrap();
        let control = scene.control::<RotationControl>(copy).unwrap().unwrap();
        assert_eq!(control.speed, Vec3::Y);
    }

    #[test]
    fn test_named_materials_are_shared() {
        let mut scene = Scene::new();
        let root = scene.create_node("root");
        let material = Material::new("Unshaded").with_name("stone").into_shared();
        for name in ["a", "b"] {
            let geometry = scene.create_geometry(name, Mesh::cube(Vec3::ONE));
            scene.attach_child(root, geometry).unwrap();
        }
        scene.set_material(root, material).unwrap();
        let capsule = scene.export(root).unwrap();

        let copy = SceneImporter::new().import(&mut scene, &capsule).unwrap();
        let a = scene.child_by_name(copy, "a").unwrap().unwrap();
        let b = scene.child_by_name(copy, "b").unwrap().unwrap();
        let (a, b) = (scene.material(a).unwrap().unwrap(), scene.material(b).unwrap().unwrap());
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.name(), Some("stone"));
    }
}
