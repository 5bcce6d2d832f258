//! Lights and light lists
//!
//! Lights attached to a spatial also affect its descendants. Each spatial
//! keeps its local [`LightList`] and a world list rebuilt during the
//! geometric update from the local lights followed by the parent's world
//! lights.

use std::rc::Rc;

use strata_core::{CapsuleError, InputCapsule, OutputCapsule, Savable};
use strata_math::consts::PI;
use strata_math::{BoundingVolume, ColorRgba, Vec3};

pub const DEFAULT_SPOT_RANGE: f32 = 100.0;
pub const DEFAULT_SPOT_INNER_ANGLE: f32 = PI / (4.0 * 8.0);
pub const DEFAULT_SPOT_OUTER_ANGLE: f32 = PI / (4.0 * 6.0);

/// Shape of a light's influence
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Uniform light from all directions
    Ambient,
    /// Parallel rays travelling along `direction`
    Directional { direction: Vec3 },
    /// Radiates from `position`; a zero radius never attenuates
    Point { position: Vec3, radius: f32 },
    /// Cone from `position` along `direction`
    Spot {
        position: Vec3,
        direction: Vec3,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    name: Option<String>,
    color: ColorRgba,
    enabled: bool,
    kind: LightKind,
}

impl Light {
    pub fn new(kind: LightKind, color: ColorRgba) -> Self {
        Self {
            name: None,
            color,
            enabled: true,
            kind,
        }
    }

    pub fn ambient(color: ColorRgba) -> Self {
        Self::new(LightKind::Ambient, color)
    }

    pub fn directional(direction: Vec3, color: ColorRgba) -> Self {
        Self::new(
            LightKind::Directional {
                direction: direction.normalize(),
            },
            color,
        )
    }

    pub fn point(position: Vec3, radius: f32, color: ColorRgba) -> Self {
        Self::new(LightKind::Point { position, radius }, color)
    }

    /// Spot light with the default range and cone angles
    pub fn spot(position: Vec3, direction: Vec3, color: ColorRgba) -> Self {
        Self::new(
            LightKind::Spot {
                position,
                direction: direction.normalize(),
                range: DEFAULT_SPOT_RANGE,
                inner_angle: DEFAULT_SPOT_INNER_ANGLE,
                outer_angle: DEFAULT_SPOT_OUTER_ANGLE,
            },
            color,
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn color(&self) -> ColorRgba {
        self.color
    }

    pub fn set_color(&mut self, color: ColorRgba) {
        self.color = color;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut LightKind {
        &mut self.kind
    }

    pub fn class_name(&self) -> &'static str {
        match self.kind {
            LightKind::Ambient => "AmbientLight",
            LightKind::Directional { .. } => "DirectionalLight",
            LightKind::Point { .. } => "PointLight",
            LightKind::Spot { .. } => "SpotLight",
        }
    }

    /// Sort key against a receiver bound; lower sorts first
    ///
    /// Ambient and directional lights always come first.
    pub fn influence_distance(&self, bound: Option<&BoundingVolume>) -> f32 {
        match (self.kind, bound) {
            (LightKind::Ambient | LightKind::Directional { .. }, _) => -1.0,
            (LightKind::Point { position, .. } | LightKind::Spot { position, .. }, Some(b)) => {
                b.distance_to_edge(position)
            }
            (_, None) => 0.0,
        }
    }

    /// Whether the light can reach anything inside `bound`
    pub fn intersects_bound(&self, bound: &BoundingVolume) -> bool {
        match self.kind {
            LightKind::Ambient | LightKind::Directional { .. } => true,
            LightKind::Point { position, radius } => {
                radius == 0.0 || bound.distance_to_edge(position) <= radius
            }
            LightKind::Spot { position, range, .. } => bound.distance_to_edge(position) <= range,
        }
    }
}

impl Savable for Light {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.set_class(self.class_name());
        out.write_savable("color", Some(&self.color));
        out.write_bool("enabled", self.enabled, true);
        out.write_string("name", self.name.as_deref(), None);
        match self.kind {
            LightKind::Ambient => {}
            LightKind::Directional { direction } => {
                out.write_savable("direction", Some(&direction));
            }
            LightKind::Point { position, radius } => {
                out.write_savable("position", Some(&position));
                out.write_f32("radius", radius, 0.0);
            }
            LightKind::Spot {
                position,
                direction,
                range,
                inner_angle,
                outer_angle,
            } => {
                out.write_savable("position", Some(&position));
                out.write_savable("direction", Some(&direction));
                out.write_f32("spotRange", range, DEFAULT_SPOT_RANGE);
                out.write_f32("spotInnerAngle", inner_angle, DEFAULT_SPOT_INNER_ANGLE);
                out.write_f32("spotOuterAngle", outer_angle, DEFAULT_SPOT_OUTER_ANGLE);
            }
        }
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let vec = |name| strata_core::read_savable_or(input, name, Vec3::ZERO);
        let kind = match input.class_name() {
            Some("AmbientLight") => LightKind::Ambient,
            Some("DirectionalLight") => LightKind::Directional {
                direction: vec("direction")?,
            },
            Some("PointLight") => LightKind::Point {
                position: vec("position")?,
                radius: input.read_f32("radius", 0.0)?,
            },
            Some("SpotLight") => LightKind::Spot {
                position: vec("position")?,
                direction: vec("direction")?,
                range: input.read_f32("spotRange", DEFAULT_SPOT_RANGE)?,
                inner_angle: input.read_f32("spotInnerAngle", DEFAULT_SPOT_INNER_ANGLE)?,
                outer_angle: input.read_f32("spotOuterAngle", DEFAULT_SPOT_OUTER_ANGLE)?,
            },
            other => {
                return Err(CapsuleError::InvalidValue {
                    field: "class".into(),
                    reason: format!("not a light: {:?}", other),
                })
            }
        };

        Ok(Self {
            name: input.read_string("name", None)?,
            color: strata_core::read_savable_or(input, "color", ColorRgba::WHITE)?,
            enabled: input.read_bool("enabled", true)?,
            kind,
        })
    }
}

/// Ordered list of shared lights
#[derive(Clone, Debug, Default)]
pub struct LightList {
    lights: Vec<Rc<Light>>,
}

impl LightList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, light: Rc<Light>) {
        self.lights.push(light);
    }

    /// Remove `light` by identity; false if it is not in the list
    pub fn remove(&mut self, light: &Rc<Light>) -> bool {
        match self.lights.iter().position(|l| Rc::ptr_eq(l, light)) {
            Some(index) => {
                self.lights.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Rc<Light>> {
        (index < self.lights.len()).then(|| self.lights.remove(index))
    }

    pub fn contains(&self, light: &Rc<Light>) -> bool {
        self.lights.iter().any(|l| Rc::ptr_eq(l, light))
    }

    pub fn get(&self, index: usize) -> Option<&Rc<Light>> {
        self.lights.get(index)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Light>> {
        self.lights.iter()
    }

    /// Copy holding new instances of every light
    pub fn deep_clone(&self) -> Self {
        Self {
            lights: self.lights.iter().map(|l| Rc::new((**l).clone())).collect(),
        }
    }

    /// World list for a spatial: `local` lights, then the parent's world lights
    pub fn compose(local: &LightList, parent_world: Option<&LightList>) -> Self {
        let mut lights = local.lights.clone();
        if let Some(parent) = parent_world {
            lights.extend(parent.lights.iter().cloned());
        }
        Self { lights }
    }

    /// Stable sort by [`Light::influence_distance`] against `bound`
    pub fn sort_by_influence(&mut self, bound: Option<&BoundingVolume>) {
        self.lights.sort_by(|a, b| {
            a.influence_distance(bound)
                .total_cmp(&b.influence_distance(bound))
        });
    }
}

impl Savable for LightList {
    fn write(&self, out: &mut dyn OutputCapsule) {
        let lights: Vec<&dyn Savable> = self.lights.iter().map(|l| &**l as &dyn Savable).collect();
        out.write_savable_list("lights", &lights);
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let lights = strata_core::read_savable_list::<Light>(input, "lights")?;
        Ok(Self {
            lights: lights.into_iter().map(Rc::new).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::MemoryCapsule;
    use strata_math::BoundingSphere;

    #[test]
    fn test_compose_puts_local_first() {
        let sun = Rc::new(Light::directional(Vec3::NEG_Y, ColorRgba::WHITE));
        let lamp = Rc::new(Light::point(Vec3::ZERO, 5.0, ColorRgba::YELLOW));

        let mut parent = LightList::new();
        parent.add(Rc::clone(&sun));
        let mut local = LightList::new();
        local.add(Rc::clone(&lamp));

        let world = LightList::compose(&local, Some(&parent));
        assert_eq!(world.len(), 2);
        assert!(Rc::ptr_eq(world.get(0).unwrap(), &lamp));
        assert!(Rc::ptr_eq(world.get(1).unwrap(), &sun));
    }

    #[test]
    fn test_remove_by_identity() {
        let a = Rc::new(Light::ambient(ColorRgba::GRAY));
        let twin = Rc::new(Light::ambient(ColorRgba::GRAY));
        let mut list = LightList::new();
        list.add(Rc::clone(&a));

        assert!(!list.remove(&twin));
        assert!(list.contains(&a));
        assert!(list.remove(&a));
        assert!(list.is_empty());
        assert!(list.remove_at(0).is_none());
    }

    #[test]
    fn test_sort_by_influence() {
        let bound = BoundingVolume::from(BoundingSphere::new(Vec3::ZERO, 1.0));
        let far = Rc::new(Light::point(Vec3::new(10.0, 0.0, 0.0), 0.0, ColorRgba::RED));
        let near = Rc::new(Light::point(Vec3::new(2.0, 0.0, 0.0), 0.0, ColorRgba::GREEN));
        let ambient = Rc::new(Light::ambient(ColorRgba::WHITE));

        let mut list = LightList::new();
        list.add(Rc::clone(&far));
        list.add(Rc::clone(&near));
        list.add(Rc::clone(&ambient));
        list.sort_by_influence(Some(&bound));

        assert!(Rc::ptr_eq(list.get(0).unwrap(), &ambient));
        assert!(Rc::ptr_eq(list.get(1).unwrap(), &near));
        assert!(Rc::ptr_eq(list.get(2).unwrap(), &far));
    }

    #[test]
    fn test_point_light_reach() {
        let bound = BoundingVolume::from(BoundingSphere::new(Vec3::ZERO, 1.0));
        assert!(Light::point(Vec3::new(3.0, 0.0, 0.0), 2.5, ColorRgba::WHITE).intersects_bound(&bound));
        assert!(!Light::point(Vec3::new(5.0, 0.0, 0.0), 2.5, ColorRgba::WHITE).intersects_bound(&bound));
        assert!(Light::point(Vec3::new(50.0, 0.0, 0.0), 0.0, ColorRgba::WHITE).intersects_bound(&bound));
    }

    #[test]
    fn test_capsule_round_trip() {
        let spot = Light::spot(Vec3::new(0.0, 4.0, 0.0), Vec3::NEG_Y, ColorRgba::BLUE).with_name("stage");
        let capsule = MemoryCapsule::from_savable(&spot);
        assert_eq!(capsule.class_name(), Some("SpotLight"));
        assert!(capsule.field("spotRange").is_none());
        let back: Light = capsule.to_savable().unwrap();
        assert_eq!(back, spot);

        let mut list = LightList::new();
        list.add(Rc::new(Light::ambient(ColorRgba::GRAY)));
        list.add(Rc::new(spot));
        let back: LightList = MemoryCapsule::from_savable(&list).to_savable().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.get(0).unwrap().class_name(), "AmbientLight");
    }
}
