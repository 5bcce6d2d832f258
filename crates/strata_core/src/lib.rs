//! # strata_core - Strata Engine Core
//!
//! Foundational pieces shared by the math and scene crates:
//! - **Handles**: generational indices used for every cross-reference in the
//!   scene graph, so a dangling reference is detected rather than followed
//! - **Capsules**: the named-field persistence contract that engine types
//!   implement, independent of any file format

pub mod capsule;
pub mod error;
pub mod handle;

pub use capsule::*;
pub use error::*;
pub use handle::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capsule::{InputCapsule, MemoryCapsule, OutputCapsule, Savable};
    pub use crate::error::{CapsuleError, Result};
    pub use crate::handle::{Handle, HandleMap};
}
