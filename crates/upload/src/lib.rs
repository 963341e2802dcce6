//! Chunked fragment upload and merge pipeline for Mosaic.
//!
//! This crate provides:
//! - `ChunkStore`: write one chunk to the temp disk and record it
//! - `FragmentStore`: create, inspect, delete and merge fragments
//! - `MergeReaper`: lease-based release of abandoned merge claims
//!
//! Operations on one fragment are serialized through `FragmentLocks`
//! together with the row store's own fragment lock.

pub mod chunks;
pub mod error;
pub mod fragments;
pub mod locks;
pub mod reaper;

pub use chunks::{ChunkData, ChunkReceipt, ChunkStore};
pub use error::{UploadError, UploadResult};
pub use fragments::FragmentStore;
pub use locks::{FragmentGuard, FragmentLocks};
pub use reaper::MergeReaper;

use mosaic_core::config::UploadConfig;
use mosaic_metadata::MetadataStore;
use mosaic_storage::ObjectStore;
use std::sync::Arc;

/// Collaborators shared by the chunk and fragment stores.
pub(crate) struct Shared {
    /// Disk holding `parts/<fragment_id>/<number>.part` files.
    pub(crate) temp: Arc<dyn ObjectStore>,
    /// Disk receiving merged files.
    pub(crate) dest: Arc<dyn ObjectStore>,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) locks: FragmentLocks,
    pub(crate) max_chunk_number: u32,
}

/// Entry point bundling the chunk and fragment stores over one set of
/// disks, row store and lock table.
#[derive(Clone)]
pub struct Uploader {
    chunks: ChunkStore,
    fragments: FragmentStore,
    metadata: Arc<dyn MetadataStore>,
}

impl Uploader {
    pub fn new(
        temp: Arc<dyn ObjectStore>,
        dest: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        config: &UploadConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            temp,
            dest,
            metadata: metadata.clone(),
            locks: FragmentLocks::new(),
            max_chunk_number: config.max_chunk_number,
        });

        Self {
            chunks: ChunkStore::new(shared.clone()),
            fragments: FragmentStore::new(shared),
            metadata,
        }
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn fragments(&self) -> &FragmentStore {
        &self.fragments
    }

    /// Build the stuck-merge reaper if a merge lease is configured.
    pub fn reaper(&self, config: &UploadConfig) -> Option<MergeReaper> {
        config
            .merge_lease()
            .map(|lease| MergeReaper::new(self.metadata.clone(), lease))
    }
}

/// Reject non-positive fragment ids before touching any collaborator.
pub(crate) fn check_fragment_id(fragment_id: i64) -> UploadResult<()> {
    if fragment_id <= 0 {
        return Err(mosaic_core::Error::InvalidFragmentId(fragment_id).into());
    }
    Ok(())
}
