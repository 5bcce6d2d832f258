//! Error types for the core library

use thiserror::Error;

/// Errors raised while reading a capsule back into a value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapsuleError {
    /// A field exists but holds a different kind of value
    #[error("field '{field}' has type {found}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A required field is absent and has no default
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A field holds a value outside the range the reader accepts
    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type alias
pub type Result<T> = core::result::Result<T, CapsuleError>;
