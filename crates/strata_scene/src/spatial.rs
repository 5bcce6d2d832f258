//! Spatial data stored in the scene arena
//!
//! A [`Spatial`] is either a node (ordered children) or a geometry (a mesh
//! drawn with a material). Everything that changes scene structure or
//! transforms goes through [`crate::graph::Scene`]; this module only holds
//! the data and read access to it.

use std::collections::BTreeMap;
use std::rc::Rc;

use bitflags::bitflags;
use strata_core::{CapsuleError, Handle, InputCapsule, OutputCapsule, Savable};
use strata_math::{BoundingVolume, Transform, Vec3};

use crate::batch::{BatchState, BatchedGeometry};
use crate::control::Control;
use crate::light::LightList;
use crate::material::Material;
use crate::mesh::Mesh;

/// Handle to a spatial in a [`crate::graph::Scene`]
pub type SpatialId = Handle<Spatial>;

bitflags! {
    /// Cached values waiting to be recomputed
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct RefreshFlags: u8 {
        /// World transform
        const TRANSFORM  = 0b0000_0001;
        /// World bound
        const BOUND      = 0b0000_0010;
        /// World light list
        const LIGHT_LIST = 0b0000_0100;
    }
}

macro_rules! hint_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident),+ $(,)? } root = $root:ident
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub enum $name {
            #[default]
            Inherit,
            $($variant),+
        }

        impl $name {
            /// Value used when every ancestor inherits
            pub const ROOT: Self = Self::$root;

            pub fn name(self) -> &'static str {
                match self {
                    Self::Inherit => "Inherit",
                    $(Self::$variant => stringify!($variant)),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    "Inherit" => Some(Self::Inherit),
                    $(stringify!($variant) => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

hint_enum! {
    /// Whether the renderer may frustum cull a spatial
    CullHint { Dynamic, Always, Never } root = Dynamic
}

hint_enum! {
    /// Whether a geometry takes part in batching
    BatchHint { Always, Never } root = Always
}

hint_enum! {
    /// Render queue a geometry is drawn in
    Bucket { Opaque, Transparent, Sky, Translucent, Gui } root = Opaque
}

hint_enum! {
    /// Shadow casting and receiving
    ShadowMode { Off, Cast, Receive, CastAndReceive } root = Off
}

/// A user data value
#[derive(Clone, Debug, PartialEq)]
pub enum UserData {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
    Vec3(Vec3),
}

impl UserData {
    /// Persisted type code
    pub fn type_code(&self) -> i32 {
        match self {
            Self::Int(_) => 0,
            Self::Float(_) => 1,
            Self::Bool(_) => 2,
            Self::String(_) => 3,
            Self::Vec3(_) => 5,
        }
    }
}

impl Savable for UserData {
    fn write(&self, out: &mut dyn OutputCapsule) {
        out.write_i32("type", self.type_code(), 0);
        match self {
            Self::Int(v) => out.write_i32("intVal", *v, 0),
            Self::Float(v) => out.write_f32("floatVal", *v, 0.0),
            Self::Bool(v) => out.write_bool("boolVal", *v, false),
            Self::String(v) => out.write_string("strVal", Some(v), None),
            Self::Vec3(v) => out.write_savable("savableVal", Some(v)),
        }
    }

    fn read(input: &dyn InputCapsule) -> strata_core::Result<Self> {
        Ok(match input.read_i32("type", 0)? {
            0 => Self::Int(input.read_i32("intVal", 0)?),
            1 => Self::Float(input.read_f32("floatVal", 0.0)?),
            2 => Self::Bool(input.read_bool("boolVal", false)?),
            3 => Self::String(input.read_string("strVal", None)?.unwrap_or_default()),
            5 => Self::Vec3(strata_core::read_savable_or(input, "savableVal", Vec3::ZERO)?),
            other => {
                return Err(CapsuleError::InvalidValue {
                    field: "type".into(),
                    reason: format!("unsupported user data type {}", other),
                })
            }
        })
    }
}

/// Node payload
#[derive(Debug, Default)]
pub struct NodeData {
    pub(crate) children: Vec<SpatialId>,
    /// Present on batch nodes
    pub(crate) batch: Option<BatchState>,
}

/// Geometry payload
#[derive(Debug, Default)]
pub struct GeometryData {
    pub(crate) mesh: Option<Mesh>,
    pub(crate) material: Option<Rc<Material>>,
    pub(crate) ignore_transform: bool,
    /// Slice record while this geometry is a batch member
    pub(crate) batch: Option<BatchedGeometry>,
    /// Owning batch node when this geometry holds a merged batch mesh
    pub(crate) batch_output_of: Option<SpatialId>,
}

#[derive(Debug)]
pub enum SpatialKind {
    Node(NodeData),
    Geometry(GeometryData),
}

/// Scene graph element
#[derive(Debug)]
pub struct Spatial {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<SpatialId>,
    pub(crate) local_transform: Transform,
    pub(crate) world_transform: Transform,
    pub(crate) world_bound: Option<BoundingVolume>,
    pub(crate) refresh_flags: RefreshFlags,
    pub(crate) local_lights: LightList,
    pub(crate) world_lights: LightList,
    pub(crate) controls: Vec<Box<dyn Control>>,
    pub(crate) cull_hint: CullHint,
    pub(crate) batch_hint: BatchHint,
    pub(crate) queue_bucket: Bucket,
    pub(crate) shadow_mode: ShadowMode,
    pub(crate) user_data: BTreeMap<String, UserData>,
    pub(crate) kind: SpatialKind,
}

impl Spatial {
    pub(crate) fn new(name: Option<String>, kind: SpatialKind) -> Self {
        Self {
            name,
            parent: None,
            local_transform: Transform::IDENTITY,
            world_transform: Transform::IDENTITY,
            world_bound: None,
            refresh_flags: RefreshFlags::all(),
            local_lights: LightList::new(),
            world_lights: LightList::new(),
            controls: Vec::new(),
            cull_hint: CullHint::Inherit,
            batch_hint: BatchHint::Inherit,
            queue_bucket: Bucket::Inherit,
            shadow_mode: ShadowMode::Inherit,
            user_data: BTreeMap::new(),
            kind,
        }
    }

    pub(crate) fn node(name: Option<String>) -> Self {
        Self::new(name, SpatialKind::Node(NodeData::default()))
    }

    pub(crate) fn geometry(name: Option<String>, mesh: Option<Mesh>) -> Self {
        Self::new(
            name,
            SpatialKind::Geometry(GeometryData {
                mesh,
                ..Default::default()
            }),
        )
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for messages; unnamed spatials read as `""`
    pub(crate) fn display_name(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    pub fn parent(&self) -> Option<SpatialId> {
        self.parent
    }

    pub fn local_transform(&self) -> &Transform {
        &self.local_transform
    }

    /// World transform as of the last refresh
    pub fn cached_world_transform(&self) -> &Transform {
        &self.world_transform
    }

    /// World bound as of the last refresh
    pub fn world_bound(&self) -> Option<&BoundingVolume> {
        self.world_bound.as_ref()
    }

    pub fn refresh_flags(&self) -> RefreshFlags {
        self.refresh_flags
    }

    pub fn local_lights(&self) -> &LightList {
        &self.local_lights
    }

    /// Lights affecting this spatial, as of the last refresh
    pub fn world_lights(&self) -> &LightList {
        &self.world_lights
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Hint set on this spatial, possibly `Inherit`
    pub fn local_cull_hint(&self) -> CullHint {
        self.cull_hint
    }

    pub fn local_batch_hint(&self) -> BatchHint {
        self.batch_hint
    }

    pub fn local_queue_bucket(&self) -> Bucket {
        self.queue_bucket
    }

    pub fn local_shadow_mode(&self) -> ShadowMode {
        self.shadow_mode
    }

    pub fn user_data(&self, key: &str) -> Option<&UserData> {
        self.user_data.get(key)
    }

    pub fn user_data_keys(&self) -> impl Iterator<Item = &str> {
        self.user_data.keys().map(String::as_str)
    }

    pub fn kind(&self) -> &SpatialKind {
        &self.kind
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, SpatialKind::Node(_))
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self.kind, SpatialKind::Geometry(_))
    }

    pub fn is_batch_node(&self) -> bool {
        matches!(&self.kind, SpatialKind::Node(n) if n.batch.is_some())
    }

    /// Whether this geometry holds a merged batch mesh
    pub fn is_batch_output(&self) -> bool {
        matches!(&self.kind, SpatialKind::Geometry(g) if g.batch_output_of.is_some())
    }

    /// Whether this geometry is a member of a batch
    pub fn is_batched(&self) -> bool {
        matches!(&self.kind, SpatialKind::Geometry(g) if g.batch.is_some())
    }

    pub(crate) fn as_node(&self) -> Option<&NodeData> {
        match &self.kind {
            SpatialKind::Node(n) => Some(n),
            SpatialKind::Geometry(_) => None,
        }
    }

    pub(crate) fn as_node_mut(&mut self) -> Option<&mut NodeData> {
        match &mut self.kind {
            SpatialKind::Node(n) => Some(n),
            SpatialKind::Geometry(_) => None,
        }
    }

    pub(crate) fn as_geometry(&self) -> Option<&GeometryData> {
        match &self.kind {
            SpatialKind::Geometry(g) => Some(g),
            SpatialKind::Node(_) => None,
        }
    }

    pub(crate) fn as_geometry_mut(&mut self) -> Option<&mut GeometryData> {
        match &mut self.kind {
            SpatialKind::Geometry(g) => Some(g),
            SpatialKind::Node(_) => None,
        }
    }

    /// Children of a node; empty for geometries
    pub fn children(&self) -> &[SpatialId] {
        match self.as_node() {
            Some(n) => &n.children,
            None => &[],
        }
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.as_geometry().and_then(|g| g.mesh.as_ref())
    }

    pub fn material(&self) -> Option<&Rc<Material>> {
        self.as_geometry().and_then(|g| g.material.as_ref())
    }

    pub fn ignores_transform(&self) -> bool {
        self.as_geometry().is_some_and(|g| g.ignore_transform)
    }
}
