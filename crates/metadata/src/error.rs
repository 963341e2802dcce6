//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("merge already in progress for fragment {fragment_id}")]
    MergeInProgress { fragment_id: i64 },

    #[error("no chunks found for fragment {fragment_id}")]
    NoChunks { fragment_id: i64 },

    #[error("chunk count mismatch for fragment {fragment_id}: expected {expected}, found {actual}")]
    ChunkCountMismatch {
        fragment_id: i64,
        expected: i64,
        actual: i64,
    },

    #[error("chunks not contiguous for fragment {fragment_id}: chunk {found} follows chunk {previous}")]
    ChunksNotContiguous {
        fragment_id: i64,
        previous: i64,
        found: i64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    pub(crate) fn fragment_not_found(fragment_id: i64) -> Self {
        Self::NotFound(format!("fragment {fragment_id}"))
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
