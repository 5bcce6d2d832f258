//! Materials
//!
//! Geometries hold materials through `Rc`; two geometries are batched
//! together only when they point at the same material instance.

use std::collections::BTreeMap;
use std::rc::Rc;

use strata_core::{CapsuleError, InputCapsule, OutputCapsule, Savable};
use strata_math::{ColorRgba, Vec2, Vec3, Vec4};

/// A named material parameter value
#[derive(Clone, Debug, PartialEq)]
pub enum MaterialParam {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Color(ColorRgba),
    /// Texture asset key, resolved by the renderer
    Texture(String),
}

impl MaterialParam {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "Float",
            Self::Int(_) => "Int",
            Self::Bool(_) => "Boolean",
            Self::Vec2(_) => "Vector2",
            Self::Vec3(_) => "Vector3",
            Self::Vec4(_) => "Vector4",
            Self::Color(_) => "Color",
            Self::Texture(_) => "Texture2D",
        }
    }
}

impl Savable for MaterialParam {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_string("varType", Some(self.type_name()), None);
        match self {
            Self::Float(v) => out.write_f32("value_float", *v, 0.0),
            Self::Int(v) => out.write_i32("value_int", *v, 0),
            Self::Bool(v) => out.write_bool("value_bool", *v, false),
            Self::Vec2(v) => out.write_savable("value_savable", Some(v)),
            Self::Vec3(v) => out.write_savable("value_savable", Some(v)),
            Self::Vec4(v) => out.write_savable("value_savable", Some(v)),
            Self::Color(v) => out.write_savable("value_savable", Some(v)),
            Self::Texture(key) => out.write_string("texture", Some(key), None),
        }
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let var_type = input
            .read_string("varType", None)?
            .ok_or_else(|| CapsuleError::MissingField("varType".into()))?;
        Ok(match var_type.as_str() {
            "Float" => Self::Float(input.read_f32("value_float", 0.0)?),
            "Int" => Self::Int(input.read_i32("value_int", 0)?),
            "Boolean" => Self::Bool(input.read_bool("value_bool", false)?),
            "Vector2" => Self::Vec2(strata_core::read_savable_or(input, "value_savable", Vec2::ZERO)?),
            "Vector3" => Self::Vec3(strata_core::read_savable_or(input, "value_savable", Vec3::ZERO)?),
            "Vector4" => Self::Vec4(strata_core::read_savable_or(input, "value_savable", Vec4::ZERO)?),
            "Color" => Self::Color(strata_core::read_savable_or(
                input,
                "value_savable",
                ColorRgba::default(),
            )?),
            "Texture2D" => Self::Texture(
                input
                    .read_string("texture", None)?
                    .ok_or_else(|| CapsuleError::MissingField("texture".into()))?,
            ),
            other => {
                return Err(CapsuleError::InvalidValue {
                    field: "varType".into(),
                    reason: format!("unknown parameter type {}", other),
                })
            }
        })
    }
}

/// Surface description shared by geometries
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    name: Option<String>,
    definition: String,
    params: BTreeMap<String, MaterialParam>,
}

impl Material {
    /// Material instantiating the definition `definition`
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            name: None,
            definition: definition.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: MaterialParam) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Wrap for sharing between geometries
    pub fn into_shared(self) -> Rc<Material> {
        Rc::new(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn param(&self, name: &str) -> Option<&MaterialParam> {
        self.params.get(name)
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: MaterialParam) {
        self.params.insert(name.into(), value);
    }

    /// Remove a parameter; returns its value
    pub fn clear_param(&mut self, name: &str) -> Option<MaterialParam> {
        self.params.remove(name)
    }

    /// Parameters in name order
    pub fn params(&self) -> impl Iterator<Item = (&str, &MaterialParam)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Same definition and parameters, regardless of name
    pub fn content_equals(&self, other: &Material) -> bool {
        self.definition == other.definition && self.params == other.params
    }
}

impl Savable for Material {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_string("name", self.name.as_deref(), None);
        out.write_string("material_def", Some(&self.definition), None);
        let params: Vec<(&str, &dyn Savable)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v as &dyn Savable))
            .collect();
        out.write_savable_map("parameters", &params);
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let mut material = Material::new(input.read_string("material_def", None)?.unwrap_or_default());
        material.name = input.read_string("name", None)?;
        for (name, child) in input.read_child_map("parameters")? {
            material.params.insert(name.to_string(), MaterialParam::read(child)?);
        }
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::MemoryCapsule;

    fn lit() -> Material {
        Material::new("Common/MatDefs/Light/Lighting.j3md")
            .with_name("brick")
            .with_param("Shininess", MaterialParam::Float(8.0))
            .with_param("UseMaterialColors", MaterialParam::Bool(true))
            .with_param("Diffuse", MaterialParam::Color(ColorRgba::new(0.8, 0.2, 0.1, 1.0)))
            .with_param("DiffuseMap", MaterialParam::Texture("Textures/brick.png".into()))
    }

    #[test]
    fn test_params() {
        let mut material = lit();
        assert_eq!(material.param("Shininess"), Some(&MaterialParam::Float(8.0)));
        assert_eq!(material.clear_param("Shininess"), Some(MaterialParam::Float(8.0)));
        assert!(material.param("Shininess").is_none());
        let names: Vec<&str> = material.params().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Diffuse", "DiffuseMap", "UseMaterialColors"]);
    }

    #[test]
    fn test_content_equals_ignores_name() {
        let a = lit();
        let b = lit().with_name("other");
        assert!(a.content_equals(&b));
        assert_ne!(a, b);
        assert!(!a.content_equals(&Material::new("Common/MatDefs/Misc/Unshaded.j3md")));
    }

    #[test]
    fn test_shared_identity() {
        let shared = lit().into_shared();
        let alias = Rc::clone(&shared);
        let copy = Rc::new((*shared).clone());
        assert!(Rc::ptr_eq(&shared, &alias));
        assert!(!Rc::ptr_eq(&shared, &copy));
    }

    #[test]
    fn test_capsule_round_trip() {
        let material = lit().with_param("Offset", MaterialParam::Vec3(Vec3::new(1.0, 2.0, 3.0)));
        let back: Material = MemoryCapsule::from_savable(&material).to_savable().unwrap();
        assert_eq!(back, material);
    }
}
