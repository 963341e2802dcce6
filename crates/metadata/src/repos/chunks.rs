//! Chunk repository.

use crate::error::MetadataResult;
use crate::models::{ChunkRow, FragmentRow};
use async_trait::async_trait;

/// Repository for chunk operations.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Lock a fragment row ahead of writing one of its chunk files.
    ///
    /// Fails with `NotFound` if the fragment is gone and `MergeInProgress`
    /// if it is claimed by a merge. The row stays locked until the returned
    /// write is committed or dropped, so no merge can be claimed while the
    /// chunk file is being replaced.
    async fn begin_chunk(&self, fragment_id: i64) -> MetadataResult<Box<dyn ChunkWrite>>;

    /// Record a stored chunk and refresh the fragment counters in one
    /// transaction. Same failures as `begin_chunk`.
    async fn record_chunk(&self, chunk: &ChunkRow) -> MetadataResult<FragmentRow> {
        self.begin_chunk(chunk.fragment_id)
            .await?
            .commit(chunk)
            .await
    }

    /// Chunk rows of a fragment ordered by number ascending.
    async fn list_chunks(&self, fragment_id: i64) -> MetadataResult<Vec<ChunkRow>>;
}

/// An open transaction holding one fragment row lock.
///
/// Dropping it without `commit` rolls the transaction back.
#[async_trait]
pub trait ChunkWrite: Send {
    /// The locked fragment row.
    fn fragment(&self) -> &FragmentRow;

    /// Upsert `chunk` (replacing any row with the same id), set the
    /// fragment's `number`/`size` to `COUNT`/`SUM` over its chunk rows and
    /// commit. Returns the updated fragment.
    async fn commit(self: Box<Self>, chunk: &ChunkRow) -> MetadataResult<FragmentRow>;
}
