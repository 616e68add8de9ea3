//! Error type shared by every fallible operation of the crate.

use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MapError>;

/// Everything that can go wrong when building, mapping, training, adapting or
/// restoring an adaptive map.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("number of bins must be positive")]
    ZeroBins,

    #[error("number of dimensions must be positive")]
    ZeroDimensions,

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("length mismatch in {what}: expected {expected}, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("edges of dimension {dim} are not strictly increasing at index {index}")]
    NonIncreasingEdges { dim: usize, index: usize },

    #[error("edge {index} of dimension {dim} is not finite")]
    NonFiniteEdge { dim: usize, index: usize },

    #[error("value {value} in dimension {dim} is outside of the domain [{min}, {max}]")]
    OutOfDomain {
        dim: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("random number {value} in dimension {dim} is outside of [0, 1]")]
    OutOfUnitInterval { dim: usize, value: f64 },

    #[error("training weight must be finite and non-negative, got {0}")]
    InvalidWeight(f64),

    #[error("damping exponent must lie in [0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("split threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),

    #[error("cannot merge accumulators of shape {left:?} and {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("bin {bin} of dimension {dim} does not exist")]
    BinOutOfRange { dim: usize, bin: usize },

    #[error("bin {bin} of dimension {dim} is too narrow to be split")]
    DegenerateSplit { dim: usize, bin: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt persisted state: {0}")]
    CorruptState(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
