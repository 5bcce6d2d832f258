//! Error types for curve evaluation

use thiserror::Error;

/// Spline and NURBS errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplineError {
    /// Segment index past the last segment
    #[error("segment {segment} out of range, spline has {count} segments")]
    SegmentOutOfRange { segment: usize, count: usize },

    /// Not enough control points for the curve type
    #[error("{kind} spline needs at least {required} control points, got {actual}")]
    TooFewControlPoints {
        kind: &'static str,
        required: usize,
        actual: usize,
    },

    /// Knot vector is not non-decreasing
    #[error("knots values cannot decrease (index {index})")]
    DecreasingKnots { index: usize },

    /// Knot vector length does not leave room for a basis of order >= 1
    #[error("{knots} knots cannot support {weights} weighted control points")]
    InvalidKnotCount { knots: usize, weights: usize },

    /// Nurb type requested without a knot vector
    #[error("cannot switch to a Nurb spline without knots and weights")]
    MissingKnots,

    /// Cox-de Boor recursion hit a zero-width knot span
    #[error("zero denominator evaluating basis function {index} of order {order}")]
    ZeroDenominator { index: usize, order: usize },
}

/// Result type for spline operations
pub type SplineResult<T> = core::result::Result<T, SplineError>;
