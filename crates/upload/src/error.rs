//! Upload pipeline error types.

use mosaic_metadata::MetadataError;
use mosaic_storage::StorageError;
use thiserror::Error;

/// Errors returned by chunk and fragment operations.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Caller input rejected before any side effect.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(String),

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

    /// Disk failure, with the fragment, chunk or path involved.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },

    /// A chunk file does not hold the number of bytes recorded for it.
    #[error(
        "fragment {fragment_id} chunk {number}: {key} holds {actual} bytes, recorded {expected}"
    )]
    ChunkSizeMismatch {
        fragment_id: i64,
        number: i64,
        key: String,
        expected: i64,
        actual: u64,
    },

    #[error("metadata error: {0}")]
    Metadata(#[source] MetadataError),

    /// The merge task stopped without reporting an outcome. The claim is
    /// left for `release` or the reaper.
    #[error("fragment {fragment_id}: merge task ended abnormally: {reason}")]
    MergeAborted { fragment_id: i64, reason: String },

    /// A merge failed and resetting its claim failed too. The fragment
    /// stays claimed until an operator or the reaper releases it.
    #[error(
        "fragment {fragment_id}: failed to release merge claim ({recovery}) after merge error: {original}"
    )]
    RecoveryFailed {
        fragment_id: i64,
        original: Box<UploadError>,
        recovery: MetadataError,
    },
}

impl UploadError {
    pub(crate) fn storage(context: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn fragment_not_found(fragment_id: i64) -> Self {
        Self::NotFound(format!("fragment {fragment_id}"))
    }

    /// Whether the error is a state conflict (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::MergeInProgress { .. }
                | Self::NoChunks { .. }
                | Self::ChunkCountMismatch { .. }
                | Self::ChunksNotContiguous { .. }
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::MergeInProgress { .. } => "merge_in_progress",
            Self::NoChunks { .. } => "no_chunks",
            Self::ChunkCountMismatch { .. } => "chunk_count_mismatch",
            Self::ChunksNotContiguous { .. } => "chunks_not_contiguous",
            Self::Storage { .. } => "storage",
            Self::ChunkSizeMismatch { .. } => "chunk_size_mismatch",
            Self::Metadata(_) => "metadata",
            Self::MergeAborted { .. } => "merge_aborted",
            Self::RecoveryFailed { .. } => "recovery_failed",
        }
    }
}

impl From<mosaic_core::Error> for UploadError {
    fn from(e: mosaic_core::Error) -> Self {
        Self::Validation {
            field: e.field(),
            message: e.to_string(),
        }
    }
}

impl From<MetadataError> for UploadError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(what) => Self::NotFound(what),
            MetadataError::MergeInProgress { fragment_id } => Self::MergeInProgress { fragment_id },
            MetadataError::NoChunks { fragment_id } => Self::NoChunks { fragment_id },
            MetadataError::ChunkCountMismatch {
                fragment_id,
                expected,
                actual,
            } => Self::ChunkCountMismatch {
                fragment_id,
                expected,
                actual,
            },
            MetadataError::ChunksNotContiguous {
                fragment_id,
                previous,
                found,
            } => Self::ChunksNotContiguous {
                fragment_id,
                previous,
                found,
            },
            other => Self::Metadata(other),
        }
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
