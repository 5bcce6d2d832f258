//! Named-field persistence contract
//!
//! Every persisted engine type writes itself as a flat set of named fields,
//! each with an explicit default. A field whose value equals its default is
//! not stored, and reading an absent field yields the default back. The
//! field names and defaults are the stable contract; the storage format is
//! whatever implements [`OutputCapsule`] / [`InputCapsule`].
//!
//! [`MemoryCapsule`] is the in-memory registry shipped with the engine. It
//! derives serde traits so any serde format can carry it to disk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CapsuleError, Result};

/// A value stored under a field name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CapsuleValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Savable(MemoryCapsule),
    SavableList(Vec<MemoryCapsule>),
    SavableMap(BTreeMap<String, MemoryCapsule>),
}

impl CapsuleValue {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CapsuleValue::Bool(_) => "bool",
            CapsuleValue::Int(_) => "int",
            CapsuleValue::Float(_) => "float",
            CapsuleValue::String(_) => "string",
            CapsuleValue::FloatArray(_) => "float[]",
            CapsuleValue::IntArray(_) => "int[]",
            CapsuleValue::Savable(_) => "savable",
            CapsuleValue::SavableList(_) => "savable[]",
            CapsuleValue::SavableMap(_) => "map<string, savable>",
        }
    }
}

/// Write side of the persistence contract
pub trait OutputCapsule {
    /// Tag the capsule with the concrete type being written
    fn set_class(&mut self, class: &str);

    fn write_bool(&mut self, name: &str, value: bool, default: bool);
    fn write_i32(&mut self, name: &str, value: i32, default: i32);
    fn write_f32(&mut self, name: &str, value: f32, default: f32);
    fn write_string(&mut self, name: &str, value: Option<&str>, default: Option<&str>);
    fn write_f32_array(&mut self, name: &str, value: Option<&[f32]>);
    fn write_i32_array(&mut self, name: &str, value: Option<&[i32]>);
    fn write_savable(&mut self, name: &str, value: Option<&dyn Savable>);
    fn write_savable_list(&mut self, name: &str, values: &[&dyn Savable]);
    fn write_savable_map(&mut self, name: &str, values: &[(&str, &dyn Savable)]);
}

/// Read side of the persistence contract
pub trait InputCapsule {
    fn class_name(&self) -> Option<&str>;
    fn has_field(&self, name: &str) -> bool;

    fn read_bool(&self, name: &str, default: bool) -> Result<bool>;
    fn read_i32(&self, name: &str, default: i32) -> Result<i32>;
    fn read_f32(&self, name: &str, default: f32) -> Result<f32>;
    fn read_string(&self, name: &str, default: Option<&str>) -> Result<Option<String>>;
    fn read_f32_array(&self, name: &str) -> Result<Option<Vec<f32>>>;
    fn read_i32_array(&self, name: &str) -> Result<Option<Vec<i32>>>;
    fn read_child(&self, name: &str) -> Result<Option<&dyn InputCapsule>>;
    fn read_child_list(&self, name: &str) -> Result<Vec<&dyn InputCapsule>>;
    fn read_child_map(&self, name: &str) -> Result<Vec<(&str, &dyn InputCapsule)>>;
}

/// A type that can be written to and read from a capsule
pub trait Savable {
    fn write(&self, out: &mut dyn OutputCapsule);

    fn read(input: &dyn InputCapsule) -> Result<Self>
    where
        Self: Sized;
}

/// Write a nested savable unless it equals `default`
pub fn write_savable_or_skip<S: Savable + PartialEq>(
    out: &mut dyn OutputCapsule,
    name: &str,
    value: &S,
    default: &S,
) {
    if value != default {
        out.write_savable(name, Some(value));
    }
}

/// Read a nested savable, falling back to `default` when absent
pub fn read_savable_or<S: Savable>(input: &dyn InputCapsule, name: &str, default: S) -> Result<S> {
    match input.read_child(name)? {
        Some(child) => S::read(child),
        None => Ok(default),
    }
}

/// Read a nested savable that may be absent
pub fn read_savable<S: Savable>(input: &dyn InputCapsule, name: &str) -> Result<Option<S>> {
    input.read_child(name)?.map(S::read).transpose()
}

/// Read a list of nested savables; an absent list reads as empty
pub fn read_savable_list<S: Savable>(input: &dyn InputCapsule, name: &str) -> Result<Vec<S>> {
    input.read_child_list(name)?.into_iter().map(S::read).collect()
}

/// In-memory field registry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryCapsule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    fields: BTreeMap<String, CapsuleValue>,
}

impl MemoryCapsule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a savable into a fresh capsule
    pub fn from_savable(value: &dyn Savable) -> Self {
        let mut capsule = Self::new();
        value.write(&mut capsule);
        capsule
    }

    /// Read the whole capsule back into a value
    pub fn to_savable<S: Savable>(&self) -> Result<S> {
        S::read(self)
    }

    /// Raw field access
    pub fn field(&self, name: &str) -> Option<&CapsuleValue> {
        self.fields.get(name)
    }

    /// Names of stored (non-default) fields
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn put(&mut self, name: &str, value: CapsuleValue) {
        self.fields.insert(name.to_owned(), value);
    }

    fn mismatch(name: &str, expected: &'static str, found: &CapsuleValue) -> CapsuleError {
        CapsuleError::TypeMismatch {
            field: name.to_owned(),
            expected,
            found: found.type_name(),
        }
    }
}

impl OutputCapsule for MemoryCapsule {
    fn set_class(&mut self, class: &str) {
        self.class = Some(class.to_owned());
    }

    fn write_bool(&mut self, name: &str, value: bool, default: bool) {
        if value != default {
            self.put(name, CapsuleValue::Bool(value));
        }
    }

    fn write_i32(&mut self, name: &str, value: i32, default: i32) {
        if value != default {
            self.put(name, CapsuleValue::Int(value));
        }
    }

    fn write_f32(&mut self, name: &str, value: f32, default: f32) {
        if value.to_bits() != default.to_bits() {
            self.put(name, CapsuleValue::Float(value));
        }
    }

    fn write_string(&mut self, name: &str, value: Option<&str>, default: Option<&str>) {
        if value == default {
            return;
        }
        match value {
            Some(s) => self.put(name, CapsuleValue::String(s.to_owned())),
            None => {
                self.fields.remove(name);
            }
        }
    }

    fn write_f32_array(&mut self, name: &str, value: Option<&[f32]>) {
        if let Some(v) = value {
            self.put(name, CapsuleValue::FloatArray(v.to_vec()));
        }
    }

    fn write_i32_array(&mut self, name: &str, value: Option<&[i32]>) {
        if let Some(v) = value {
            self.put(name, CapsuleValue::IntArray(v.to_vec()));
        }
    }

    fn write_savable(&mut self, name: &str, value: Option<&dyn Savable>) {
        if let Some(v) = value {
            self.put(name, CapsuleValue::Savable(MemoryCapsule::from_savable(v)));
        }
    }

    fn write_savable_list(&mut self, name: &str, values: &[&dyn Savable]) {
        if values.is_empty() {
            return;
        }
        let list = values.iter().map(|v| MemoryCapsule::from_savable(*v)).collect();
        self.put(name, CapsuleValue::SavableList(list));
    }

    fn write_savable_map(&mut self, name: &str, values: &[(&str, &dyn Savable)]) {
        if values.is_empty() {
            return;
        }
        let map = values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), MemoryCapsule::from_savable(*v)))
            .collect();
        self.put(name, CapsuleValue::SavableMap(map));
    }
}

impl InputCapsule for MemoryCapsule {
    fn class_name(&self) -> Option<&str> {
        self.class.as_deref()
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn read_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.fields.get(name) {
            None => Ok(default),
            Some(CapsuleValue::Bool(v)) => Ok(*v),
            Some(other) => Err(Self::mismatch(name, "bool", other)),
        }
    }

    fn read_i32(&self, name: &str, default: i32) -> Result<i32> {
        match self.fields.get(name) {
            None => Ok(default),
            Some(CapsuleValue::Int(v)) => Ok(*v),
            Some(other) => Err(Self::mismatch(name, "int", other)),
        }
    }

    fn read_f32(&self, name: &str, default: f32) -> Result<f32> {
        match self.fields.get(name) {
            None => Ok(default),
            Some(CapsuleValue::Float(v)) => Ok(*v),
            // Integral floats survive some text formats as ints
            Some(CapsuleValue::Int(v)) => Ok(*v as f32),
            Some(other) => Err(Self::mismatch(name, "float", other)),
        }
    }

    fn read_string(&self, name: &str, default: Option<&str>) -> Result<Option<String>> {
        match self.fields.get(name) {
            None => Ok(default.map(str::to_owned)),
            Some(CapsuleValue::String(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(name, "string", other)),
        }
    }

    fn read_f32_array(&self, name: &str) -> Result<Option<Vec<f32>>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(CapsuleValue::FloatArray(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(name, "float[]", other)),
        }
    }

    fn read_i32_array(&self, name: &str) -> Result<Option<Vec<i32>>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(CapsuleValue::IntArray(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(name, "int[]", other)),
        }
    }

    fn read_child(&self, name: &str) -> Result<Option<&dyn InputCapsule>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(CapsuleValue::Savable(v)) => Ok(Some(v as &dyn InputCapsule)),
            Some(other) => Err(Self::mismatch(name, "savable", other)),
        }
    }

    fn read_child_list(&self, name: &str) -> Result<Vec<&dyn InputCapsule>> {
        match self.fields.get(name) {
            None => Ok(Vec::new()),
            Some(CapsuleValue::SavableList(v)) => {
                Ok(v.iter().map(|c| c as &dyn InputCapsule).collect())
            }
            Some(other) => Err(Self::mismatch(name, "savable[]", other)),
        }
    }

    fn read_child_map(&self, name: &str) -> Result<Vec<(&str, &dyn InputCapsule)>> {
        match self.fields.get(name) {
            None => Ok(Vec::new()),
            Some(CapsuleValue::SavableMap(v)) => Ok(v
                .iter()
                .map(|(k, c)| (k.as_str(), c as &dyn InputCapsule))
                .collect()),
            Some(other) => Err(Self::mismatch(name, "map<string, savable>", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Probe {
        name: String,
        weight: f32,
        visible: bool,
        children: Vec<Probe>,
    }

    impl Savable for Probe {
        fn write(&self, out: &mut dyn OutputCapsule) {
            out.set_class("Probe");
            out.write_string("name", Some(&self.name), None);
            out.write_f32("weight", self.weight, 1.0);
            out.write_bool("visible", self.visible, true);
            let children: Vec<&dyn Savable> = self.children.iter().map(|c| c as &dyn Savable).collect();
            out.write_savable_list("children", &children);
        }

        fn read(input: &dyn InputCapsule) -> Result<Self> {
            Ok(Self {
                name: input.read_string("name", None)?.unwrap_or_default(),
                weight: input.read_f32("weight", 1.0)?,
                visible: input.read_bool("visible", true)?,
                children: read_savable_list(input, "children")?,
            })
        }
    }

    fn leaf(name: &str) -> Probe {
        Probe {
            name: name.into(),
            weight: 1.0,
            visible: true,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_defaults_are_not_stored() {
        let capsule = MemoryCapsule::from_savable(&leaf("a"));
        let names: Vec<&str> = capsule.field_names().collect();
        assert_eq!(names, vec!["name"]);
        assert_eq!(capsule.class_name(), Some("Probe"));
    }

    #[test]
    fn test_nested_round_trip() {
        let mut root = leaf("root");
        root.weight = 2.5;
        root.visible = false;
        root.children = vec![leaf("x"), leaf("y")];

        let capsule = MemoryCapsule::from_savable(&root);
        let back: Probe = capsule.to_savable().unwrap();
        assert_eq!(back, root);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let mut capsule = MemoryCapsule::new();
        capsule.write_i32("weight", 3, 0);
        assert_eq!(capsule.read_f32("weight", 0.0), Ok(3.0));
        let err = capsule.read_bool("weight", false).unwrap_err();
        assert!(matches!(err, CapsuleError::TypeMismatch { .. }));
    }

    #[test]
    fn test_serde_json_round_trip() {
        let capsule = MemoryCapsule::from_savable(&leaf("json"));
        let text = serde_json::to_string(&capsule).unwrap();
        let back: MemoryCapsule = serde_json::from_str(&text).unwrap();
        assert_eq!(back, capsule);
    }
}
