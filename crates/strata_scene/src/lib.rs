//! # strata_scene - Scene Graph
//!
//! A retained scene graph over a generational arena:
//! - **Spatials**: nodes and geometries addressed by [`SpatialId`], with
//!   local/world transforms, bounds, lights, controls and render hints
//! - **Refresh flags**: world state is recomputed lazily and only where a
//!   change made it stale, either by [`Scene::update_geometric_state`] or by
//!   individual world queries
//! - **Batching**: geometries under a batch node are merged per material,
//!   and a moved member rewrites only its own vertex slice
//! - **Persistence**: subtrees export to and import from capsules
//!
//! ```ignore
//! let mut scene = Scene::new();
//! let root = scene.create_node("root");
//! let cube = scene.create_geometry("cube", Mesh::cube(Vec3::splat(0.5)));
//! scene.attach_child(root, cube)?;
//! scene.set_local_translation(cube, Vec3::new(0.0, 1.0, 0.0))?;
//! scene.update_geometric_state(root)?;
//! ```

pub mod batch;
pub mod buffer;
pub mod bvh;
pub mod collision;
pub mod config;
pub mod control;
pub mod error;
pub mod export;
pub mod graph;
pub mod light;
pub mod material;
pub mod mesh;
pub mod spatial;

pub use batch::*;
pub use buffer::*;
pub use bvh::*;
pub use collision::*;
pub use config::*;
pub use control::*;
pub use error::*;
pub use export::*;
pub use graph::*;
pub use light::*;
pub use material::*;
pub use mesh::*;
pub use spatial::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::buffer::{BufferType, VertexBuffer};
    pub use crate::collision::{CollisionResult, CollisionResults};
    pub use crate::config::SceneConfig;
    pub use crate::control::Control;
    pub use crate::error::{Result, SceneError};
    pub use crate::export::SceneImporter;
    pub use crate::graph::{CloneMode, DfsMode, Scene};
    pub use crate::light::{Light, LightList};
    pub use crate::material::{Material, MaterialParam};
    pub use crate::mesh::{Mesh, Mode};
    pub use crate::spatial::{BatchHint, Bucket, CullHint, ShadowMode, Spatial, SpatialId, UserData};
}
