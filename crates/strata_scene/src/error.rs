//! Error types for the scene graph

use strata_core::CapsuleError;
use thiserror::Error;

use crate::spatial::SpatialId;

/// Scene graph errors
#[derive(Debug, Error)]
pub enum SceneError {
    /// Handle refers to a removed spatial
    #[error("Stale spatial handle: {0:?}")]
    StaleHandle(SpatialId),

    /// Operation needs a node
    #[error("Spatial {0:?} is not a node")]
    NotANode(SpatialId),

    /// Operation needs a geometry
    #[error("Spatial {0:?} is not a geometry")]
    NotAGeometry(SpatialId),

    /// Operation needs a batch node
    #[error("Spatial {0:?} is not a batch node")]
    NotABatchNode(SpatialId),

    /// Geometry has no mesh where one is required
    #[error("Geometry '{0}' has no mesh")]
    MissingMesh(String),

    /// Geometry has no material where one is required
    #[error("Geometry '{0}' has no material")]
    MissingMaterial(String),

    /// Attaching would make a spatial its own ancestor
    #[error("Cannot attach {child:?} below its own descendant {parent:?}")]
    CyclicAttach { parent: SpatialId, child: SpatialId },

    /// Child index past the end of the child list
    #[error("Child index {index} out of bounds for {len} children")]
    ChildIndexOutOfBounds { index: usize, len: usize },

    /// Vertex buffer contents are inconsistent
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Operation is not supported in the current state
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Refresh flags left set after a geometric update
    #[error("Refresh flags {flags} remain on {id:?} after update")]
    RefreshFlagsRemain { id: SpatialId, flags: String },

    /// Capsule read failed
    #[error("Capsule error: {0}")]
    Capsule(#[from] CapsuleError),
}

/// Result type for scene operations
pub type Result<T> = std::result::Result<T, SceneError>;
