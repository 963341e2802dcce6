//! Chunk writes.

use crate::error::{UploadError, UploadResult};
use crate::{Shared, check_fragment_id};
use bytes::Bytes;
use mosaic_core::{ChunkId, ChunkInfo, ChunkNumber, FragmentInfo, chunk_key, fragment_dir};
use mosaic_metadata::{ChunkRow, ChunkWrite};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

/// Content of an uploaded chunk.
#[derive(Debug)]
pub enum ChunkData {
    /// Body held in memory.
    Bytes(Bytes),
    /// Local temporary file, moved into place on the temp disk.
    File(PathBuf),
}

/// Outcome of a stored chunk.
#[derive(Debug, Clone)]
pub struct ChunkReceipt {
    pub chunk: ChunkInfo,
    /// Fragment with refreshed counters.
    pub fragment: FragmentInfo,
}

impl ChunkReceipt {
    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}

/// Stores chunks on the temp disk and keeps the fragment counters in step.
#[derive(Clone)]
pub struct ChunkStore {
    shared: Arc<Shared>,
}

impl ChunkStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Store chunk `number` of `fragment_id`.
    ///
    /// Locks the fragment row, writes `parts/<fragment_id>/<number>.part`,
    /// upserts the chunk row and recomputes the fragment counters before the
    /// lock is released. Re-uploading a number replaces the earlier chunk.
    /// A claimed fragment is rejected before anything is written. On a write
    /// or record failure the fragment's chunk directory is removed and the
    /// original error returned.
    #[instrument(skip(self, data))]
    pub async fn create(
        &self,
        fragment_id: i64,
        number: i64,
        data: ChunkData,
    ) -> UploadResult<ChunkReceipt> {
        check_fragment_id(fragment_id)?;
        let number = ChunkNumber::new(number, self.shared.max_chunk_number)?;

        let _guard = self.shared.locks.lock(fragment_id).await;

        // The row lock is held across the file write; dropping `pending`
        // rolls the transaction back.
        let pending = self.shared.metadata.begin_chunk(fragment_id).await?;

        match self.write_and_record(pending, number, data).await {
            Ok(receipt) => {
                tracing::debug!(
                    fragment_id,
                    number = number.get(),
                    size = receipt.chunk.size,
                    chunks = receipt.fragment.number,
                    "Stored chunk"
                );
                Ok(receipt)
            }
            Err(err) => {
                tracing::warn!(
                    fragment_id,
                    number = number.get(),
                    error = %err,
                    "Chunk upload failed"
                );
                if !err.is_conflict() {
                    self.remove_fragment_dir(fragment_id).await;
                }
                Err(err)
            }
        }
    }

    async fn write_and_record(
        &self,
        pending: Box<dyn ChunkWrite>,
        number: ChunkNumber,
        data: ChunkData,
    ) -> UploadResult<ChunkReceipt> {
        let fragment_id = pending.fragment().id;
        let key = chunk_key(fragment_id, number);
        let context = || format!("fragment {fragment_id} chunk {number}: write {key}");

        let size = match data {
            ChunkData::Bytes(bytes) => {
                let size = bytes.len() as i64;
                self.shared
                    .temp
                    .put(&key, bytes)
                    .await
                    .map_err(|e| UploadError::storage(context(), e))?;
                size
            }
            ChunkData::File(path) => {
                let size = self
                    .shared
                    .temp
                    .put_file(&key, &path)
                    .await
                    .map_err(|e| UploadError::storage(context(), e))?;
                size as i64
            }
        };

        let row = ChunkRow {
            id: ChunkId::compute(fragment_id, number).to_hex(),
            fragment_id,
            number: i64::from(number.get()),
            size,
            create_time: mosaic_core::unix_now(),
        };
        let fragment = pending.commit(&row).await?;

        Ok(ChunkReceipt {
            chunk: row.into(),
            fragment: fragment.into(),
        })
    }

    /// Best-effort removal of every chunk file of a fragment.
    async fn remove_fragment_dir(&self, fragment_id: i64) {
        let dir = fragment_dir(fragment_id);
        if let Err(e) = self.shared.temp.delete_prefix(&dir).await {
            tracing::error!(
                fragment_id,
                dir = %dir,
                error = %e,
                "Failed to clean up chunk directory"
            );
        }
    }
}
