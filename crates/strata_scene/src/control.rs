//! Per-spatial behaviours run during the logical update
//!
//! While a spatial's controls run they are detached from it, so a control
//! may freely mutate the scene, including its own spatial.

use std::any::Any;
use std::fmt;

use strata_core::{InputCapsule, OutputCapsule, Savable};
use strata_math::{Quat, Vec3};

use crate::error::Result;
use crate::graph::Scene;
use crate::spatial::SpatialId;

/// Reads a control back from a capsule written by [`Control::save`]
pub type ControlReader = fn(&dyn InputCapsule) -> strata_core::Result<Box<dyn Control>>;

/// Behaviour attached to a spatial
pub trait Control: fmt::Debug {
    /// Advance by `tpf` seconds
    fn update(&mut self, scene: &mut Scene, spatial: SpatialId, tpf: f32) -> Result<()>;

    fn is_enabled(&self) -> bool {
        true
    }

    fn set_enabled(&mut self, _enabled: bool) {}

    /// Copy for a cloned spatial; `None` drops the control from the clone
    fn clone_for_spatial(&self) -> Option<Box<dyn Control>>;

    /// Class name used when the control is persisted
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Write persistent state; controls that return false are not exported
    fn save(&self, _out: &mut dyn OutputCapsule) -> bool {
        false
    }
}

/// Spins its spatial at a constant angular speed
#[derive(Clone, Debug, PartialEq)]
pub struct RotationControl {
    /// Radians per second about X, Y and Z
    pub speed: Vec3,
    enabled: bool,
}

impl RotationControl {
    pub const TYPE_NAME: &'static str = "RotationControl";

    pub fn new(speed: Vec3) -> Self {
        Self {
            speed,
            enabled: true,
        }
    }

    /// Reader for [`crate::export::SceneImporter::register_control`]
    pub fn reader(input: &dyn InputCapsule) -> strata_core::Result<Box<dyn Control>> {
        Ok(Box::new(Self::read(input)?))
    }
}

impl Control for RotationControl {
    fn update(&mut self, scene: &mut Scene, spatial: SpatialId, tpf: f32) -> Result<()> {
        let step = self.speed * tpf;
        scene.rotate(spatial, Quat::from_angles(step.x, step.y, step.z))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn clone_for_spatial(&self) -> Option<Box<dyn Control>> {
        Some(Box::new(self.clone()))
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn save(&self, out: &mut dyn OutputCapsule) -> bool {
        out.set_class(Self::TYPE_NAME);
        self.write(out);
        true
    }
}

impl Savable for RotationControl {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_savable("speed", Some(&self.speed));
        out.write_bool("enabled", self.enabled, true);
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        Ok(Self {
            speed: strata_core::read_savable_or(input, "speed", Vec3::ZERO)?,
            enabled: input.read_bool("enabled", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strata_core::MemoryCapsule;
    use strata_math::consts::FRAC_PI_2;

    #[test]
    fn test_rotation_control_spins_spatial() {
        let mut scene = Scene::new();
        let node = scene.create_node("spinner");
        scene
            .add_control(node, Box::new(RotationControl::new(Vec3::new(0.0, FRAC_PI_2, 0.0))))
            .unwrap();

        scene.update_logical_state(node, 1.0).unwrap();
        scene.update_geometric_state(node).unwrap();

        let rotated = scene.local_to_world(node, Vec3::X).unwrap();
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(rotated.z, -1.0, epsilon = 1e-5);
        assert_eq!(scene.get(node).unwrap().control_count(), 1);
    }

    #[test]
    fn test_disabled_control_is_skipped() {
        let mut scene = Scene::new();
        let node = scene.create_node("idle");
        let mut control = RotationControl::new(Vec3::new(1.0, 0.0, 0.0));
        control.set_enabled(false);
        scene.add_control(node, Box::new(control)).unwrap();

        scene.update_logical_state(node, 1.0).unwrap();
        assert!(scene.get(node).unwrap().local_transform().rotation.is_identity());
    }

    #[test]
    fn test_save_and_read() {
        let control = RotationControl::new(Vec3::new(0.5, 0.0, 0.0));
        let mut capsule = MemoryCapsule::new();
        assert!(control.save(&mut capsule));
        assert_eq!(capsule.class_name(), Some(RotationControl::TYPE_NAME));

        let back = RotationControl::reader(&capsule).unwrap();
        let back = back.as_any().downcast_ref::<RotationControl>().unwrap();
        assert_eq!(back, &control);
    }
}
