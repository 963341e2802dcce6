//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("fragment name cannot be empty")]
    EmptyFragmentPath,

    #[error("fragment name format invalid: {0}")]
    InvalidFragmentPath(String),

    #[error("invalid fragment id: {0} (must be positive)")]
    InvalidFragmentId(i64),

    #[error("chunk number {number} out of range (must be between 1 and {max})")]
    ChunkNumberOutOfRange { number: i64, max: u32 },
}

impl Error {
    /// Name of the caller-supplied field this error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyFragmentPath | Self::InvalidFragmentPath(_) => "path",
            Self::InvalidFragmentId(_) => "fragment_id",
            Self::ChunkNumberOutOfRange { .. } => "number",
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
