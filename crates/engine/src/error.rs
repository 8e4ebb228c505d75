//! Engine errors
//!
//! Configuration problems are errors; run failures (divergence, step-size
//! underflow, cancellation) are statuses carried on the finalized run.

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model {model} requires parameter {name}")]
    MissingParameter { model: String, name: String },

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid sweep: {0}")]
    InvalidSweep(String),
}
