//! Typed vertex attribute buffers
//!
//! A [`VertexBuffer`] is one attribute stream of a mesh: its semantic
//! [`BufferType`], the number of components per element, and the raw data in
//! one of the supported [`Format`]s. Renderers consume [`VertexBuffer::as_bytes`].

use serde::{Deserialize, Serialize};
use strata_core::{CapsuleError, InputCapsule, OutputCapsule, Savable};
use strata_math::Vec3;

/// Semantic meaning of a buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BufferType {
    Position,
    Normal,
    Tangent,
    Binormal,
    Color,
    TexCoord,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    Index,
    Size,
    BoneWeight,
    BoneIndex,
    BindPosePosition,
    BindPoseNormal,
    BindPoseTangent,
    InterleavedData,
}

impl BufferType {
    pub const ALL: [BufferType; 17] = [
        Self::Position,
        Self::Normal,
        Self::Tangent,
        Self::Binormal,
        Self::Color,
        Self::TexCoord,
        Self::TexCoord2,
        Self::TexCoord3,
        Self::TexCoord4,
        Self::Index,
        Self::Size,
        Self::BoneWeight,
        Self::BoneIndex,
        Self::BindPosePosition,
        Self::BindPoseNormal,
        Self::BindPoseTangent,
        Self::InterleavedData,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "Position",
            Self::Normal => "Normal",
            Self::Tangent => "Tangent",
            Self::Binormal => "Binormal",
            Self::Color => "Color",
            Self::TexCoord => "TexCoord",
            Self::TexCoord2 => "TexCoord2",
            Self::TexCoord3 => "TexCoord3",
            Self::TexCoord4 => "TexCoord4",
            Self::Index => "Index",
            Self::Size => "Size",
            Self::BoneWeight => "BoneWeight",
            Self::BoneIndex => "BoneIndex",
            Self::BindPosePosition => "BindPosePosition",
            Self::BindPoseNormal => "BindPoseNormal",
            Self::BindPoseTangent => "BindPoseTangent",
            Self::InterleavedData => "InterleavedData",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Buffers whose data is a direction rather than a point
    pub fn is_direction(self) -> bool {
        matches!(self, Self::Normal | Self::Tangent | Self::Binormal)
    }
}

/// How often the buffer contents change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Usage {
    /// Written once
    Static,
    /// Updated occasionally
    #[default]
    Dynamic,
    /// Updated every frame
    Stream,
    /// Never uploaded
    CpuOnly,
}

impl Usage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Static => "Static",
            Self::Dynamic => "Dynamic",
            Self::Stream => "Stream",
            Self::CpuOnly => "CpuOnly",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Static, Self::Dynamic, Self::Stream, Self::CpuOnly]
            .into_iter()
            .find(|u| u.name() == name)
    }
}

/// Element storage format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Float,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Short,
}

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "Float",
            Self::UnsignedInt => "UnsignedInt",
            Self::UnsignedShort => "UnsignedShort",
            Self::UnsignedByte => "UnsignedByte",
            Self::Short => "Short",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Float,
            Self::UnsignedInt,
            Self::UnsignedShort,
            Self::UnsignedByte,
            Self::Short,
        ]
        .into_iter()
        .find(|f| f.name() == name)
    }

    /// Size of one component in bytes
    pub fn size(self) -> usize {
        match self {
            Self::Float | Self::UnsignedInt => 4,
            Self::UnsignedShort | Self::Short => 2,
            Self::UnsignedByte => 1,
        }
    }
}

/// Raw buffer contents
#[derive(Clone, Debug, PartialEq)]
pub enum BufferData {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    I16(Vec<i16>),
}

impl BufferData {
    pub fn format(&self) -> Format {
        match self {
            Self::F32(_) => Format::Float,
            Self::U32(_) => Format::UnsignedInt,
            Self::U16(_) => Format::UnsignedShort,
            Self::U8(_) => Format::UnsignedByte,
            Self::I16(_) => Format::Short,
        }
    }

    /// Number of scalar components stored
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::F32(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v.as_slice(),
            Self::I16(v) => bytemuck::cast_slice(v),
        }
    }

    /// Component `i` as an unsigned integer; None for float data
    pub fn get_u32(&self, i: usize) -> Option<u32> {
        match self {
            Self::F32(_) => None,
            Self::U32(v) => v.get(i).copied(),
            Self::U16(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U8(v) => v.get(i).map(|&x| u32::from(x)),
            Self::I16(v) => v.get(i).and_then(|&x| u32::try_from(x).ok()),
        }
    }

    /// Component `i` widened to `f32`
    pub fn get_f32(&self, i: usize) -> Option<f32> {
        match self {
            Self::F32(v) => v.get(i).copied(),
            Self::U32(v) => v.get(i).map(|&x| x as f32),
            Self::U16(v) => v.get(i).map(|&x| f32::from(x)),
            Self::U8(v) => v.get(i).map(|&x| f32::from(x)),
            Self::I16(v) => v.get(i).map(|&x| f32::from(x)),
        }
    }

    /// Empty data of the same format with room for `capacity` components
    pub fn empty_like(&self, capacity: usize) -> Self {
        match self {
            Self::F32(_) => Self::F32(Vec::with_capacity(capacity)),
            Self::U32(_) => Self::U32(Vec::with_capacity(capacity)),
            Self::U16(_) => Self::U16(Vec::with_capacity(capacity)),
            Self::U8(_) => Self::U8(Vec::with_capacity(capacity)),
            Self::I16(_) => Self::I16(Vec::with_capacity(capacity)),
        }
    }

    /// Append `other`; false if the formats differ
    pub fn extend_from(&mut self, other: &BufferData) -> bool {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a.extend_from_slice(b),
            (Self::U32(a), Self::U32(b)) => a.extend_from_slice(b),
            (Self::U16(a), Self::U16(b)) => a.extend_from_slice(b),
            (Self::U8(a), Self::U8(b)) => a.extend_from_slice(b),
            (Self::I16(a), Self::I16(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }

    /// Index data in the narrowest format that holds `vertex_count` vertices
    ///
    /// Indices that do not fit 16 bits keep the 32-bit format.
    pub fn indices_for(vertex_count: usize, indices: Vec<u32>) -> Self {
        if vertex_count >= 65536 {
            return Self::U32(indices);
        }
        let narrow: Option<Vec<u16>> = indices.iter().map(|&i| u16::try_from(i).ok()).collect();
        match narrow {
            Some(narrow) => Self::U16(narrow),
            None => Self::U32(indices),
        }
    }
}

/// One attribute stream of a mesh
#[derive(Clone, Debug, PartialEq)]
pub struct VertexBuffer {
    buffer_type: BufferType,
    components: usize,
    data: BufferData,
    usage: Usage,
    normalized: bool,
}

impl VertexBuffer {
    pub fn new(buffer_type: BufferType, components: usize, data: BufferData) -> Self {
        Self {
            buffer_type,
            components,
            data,
            usage: Usage::default(),
            normalized: false,
        }
    }

    pub fn from_f32(buffer_type: BufferType, components: usize, data: Vec<f32>) -> Self {
        Self::new(buffer_type, components, BufferData::F32(data))
    }

    /// Flatten 3D points into a three-component float buffer
    pub fn from_vec3(buffer_type: BufferType, data: &[Vec3]) -> Self {
        Self::from_f32(buffer_type, 3, data.iter().flat_map(|v| v.to_array()).collect())
    }

    pub fn from_u16_indices(indices: Vec<u16>) -> Self {
        Self::new(BufferType::Index, 1, BufferData::U16(indices))
    }

    pub fn from_u32_indices(indices: Vec<u32>) -> Self {
        Self::new(BufferType::Index, 1, BufferData::U32(indices))
    }

    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn format(&self) -> Format {
        self.data.format()
    }

    pub fn data(&self) -> &BufferData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut BufferData {
        &mut self.data
    }

    /// Replace the contents, keeping type and component count
    pub fn update_data(&mut self, data: BufferData) {
        self.data = data;
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn set_usage(&mut self, usage: Usage) {
        self.usage = usage;
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn set_normalized(&mut self, normalized: bool) {
        self.normalized = normalized;
    }

    /// Number of elements (vertices, or indices for an index buffer)
    pub fn num_elements(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.data.len() / self.components
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            BufferData::F32(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.data {
            BufferData::F32(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }

    /// First three components of element `i`
    pub fn vec3(&self, i: usize) -> Option<Vec3> {
        if self.components < 3 {
            return None;
        }
        let data = self.as_f32()?;
        let base = i * self.components;
        data.get(base..base + 3).map(Vec3::from_slice)
    }

    /// Overwrite the first three components of element `i`
    pub fn set_vec3(&mut self, i: usize, value: Vec3) -> bool {
        let components = self.components;
        if components < 3 {
            return false;
        }
        let Some(data) = self.as_f32_mut() else {
            return false;
        };
        let base = i * components;
        match data.get_mut(base..base + 3) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_array());
                true
            }
            None => false,
        }
    }

    /// Index `i` of an integer buffer
    pub fn index(&self, i: usize) -> Option<u32> {
        self.data.get_u32(i)
    }

    /// Every integer component widened to `u32`
    pub fn to_u32_vec(&self) -> Vec<u32> {
        (0..self.data.len()).filter_map(|i| self.data.get_u32(i)).collect()
    }

    /// Independent copy of this buffer
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

impl Savable for VertexBuffer {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_i32("components", self.components as i32, 0);
        out.write_string("usage", Some(self.usage.name()), Some(Usage::Dynamic.name()));
        out.write_string("buffer_type", Some(self.buffer_type.name()), None);
        out.write_string("format", Some(self.format().name()), Some(Format::Float.name()));
        out.write_bool("normalized", self.normalized, false);
        match &self.data {
            BufferData::F32(v) => out.write_f32_array("dataFloat", Some(v.as_slice())),
            BufferData::U32(v) => {
                let ints: Vec<i32> = v.iter().map(|&x| x as i32).collect();
                out.write_i32_array("dataInt", Some(ints.as_slice()));
            }
            BufferData::U16(v) => {
                let ints: Vec<i32> = v.iter().map(|&x| i32::from(x)).collect();
                out.write_i32_array("dataShort", Some(ints.as_slice()));
            }
            BufferData::I16(v) => {
                let ints: Vec<i32> = v.iter().map(|&x| i32::from(x)).collect();
                out.write_i32_array("dataShort", Some(ints.as_slice()));
            }
            BufferData::U8(v) => {
                let ints: Vec<i32> = v.iter().map(|&x| i32::from(x)).collect();
                out.write_i32_array("dataByte", Some(ints.as_slice()));
            }
        }
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        let invalid = |field: &str, reason: String| CapsuleError::InvalidValue {
            field: field.into(),
            reason,
        };

        let type_name = input
            .read_string("buffer_type", None)?
            .ok_or_else(|| CapsuleError::MissingField("buffer_type".into()))?;
        let buffer_type = BufferType::from_name(&type_name)
            .ok_or_else(|| invalid("buffer_type", format!("unknown buffer type {}", type_name)))?;

        let format_name = input
            .read_string("format", Some(Format::Float.name()))?
            .unwrap_or_default();
        let format = Format::from_name(&format_name)
            .ok_or_else(|| invalid("format", format!("unknown format {}", format_name)))?;

        let usage_name = input
            .read_string("usage", Some(Usage::Dynamic.name()))?
            .unwrap_or_default();
        let usage = Usage::from_name(&usage_name)
            .ok_or_else(|| invalid("usage", format!("unknown usage {}", usage_name)))?;

        let components = input.read_i32("components", 0)?;
        let components = usize::try_from(components)
            .map_err(|_| invalid("components", format!("negative count {}", components)))?;

        let ints = |name: &str| -> strata_core::Result<Vec<i32>> {
            Ok(input.read_i32_array(name)?.unwrap_or_default())
        };
        let data = match format {
            Format::Float => BufferData::F32(input.read_f32_array("dataFloat")?.unwrap_or_default()),
            Format::UnsignedInt => BufferData::U32(ints("dataInt")?.into_iter().map(|x| x as u32).collect()),
            Format::UnsignedShort => BufferData::U16(ints("dataShort")?.into_iter().map(|x| x as u16).collect()),
            Format::Short => BufferData::I16(ints("dataShort")?.into_iter().map(|x| x as i16).collect()),
            Format::UnsignedByte => BufferData::U8(ints("dataByte")?.into_iter().map(|x| x as u8).collect()),
        };

        let mut buffer = Self::new(buffer_type, components, data);
        buffer.usage = usage;
        buffer.normalized = input.read_bool("normalized", false)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::MemoryCapsule;

    #[test]
    fn test_element_access() {
        let mut buffer = VertexBuffer::from_vec3(
            BufferType::Position,
            &[Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0)],
        );
        assert_eq!(buffer.num_elements(), 2);
        assert_eq!(buffer.vec3(1), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(buffer.vec3(2), None);

        assert!(buffer.set_vec3(0, Vec3::ONE));
        assert_eq!(buffer.vec3(0), Some(Vec3::ONE));
        assert!(!buffer.set_vec3(5, Vec3::ONE));
    }

    #[test]
    fn test_as_bytes_matches_format() {
        let buffer = VertexBuffer::from_u16_indices(vec![0, 1, 2]);
        assert_eq!(buffer.as_bytes().len(), 3 * Format::UnsignedShort.size());
        assert_eq!(buffer.index(2), Some(2));

        let floats = VertexBuffer::from_f32(BufferType::TexCoord, 2, vec![0.5; 4]);
        assert_eq!(floats.as_bytes().len(), 16);
        assert_eq!(floats.index(0), None);
    }

    #[test]
    fn test_index_width() {
        assert_eq!(BufferData::indices_for(65535, vec![1]).format(), Format::UnsignedShort);
        assert_eq!(BufferData::indices_for(65536, vec![1]).format(), Format::UnsignedInt);
        assert_eq!(
            BufferData::indices_for(8, vec![0, 1, 70000]),
            BufferData::U32(vec![0, 1, 70000])
        );
    }

    #[test]
    fn test_extend_requires_same_format() {
        let mut a = BufferData::F32(vec![1.0]);
        assert!(a.extend_from(&BufferData::F32(vec![2.0])));
        assert!(!a.extend_from(&BufferData::U16(vec![2])));
        assert_eq!(a, BufferData::F32(vec![1.0, 2.0]));
    }

    #[test]
    fn test_capsule_round_trip() {
        let mut buffer = VertexBuffer::from_u16_indices(vec![0, 2, 1, 65535]);
        buffer.set_usage(Usage::Static);
        let capsule = MemoryCapsule::from_savable(&buffer);
        assert!(capsule.field("dataShort").is_some());
        let back: VertexBuffer = capsule.to_savable().unwrap();
        assert_eq!(back, buffer);
    }
}
