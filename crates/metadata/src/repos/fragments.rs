//! Fragment repository.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{ChunkRow, FragmentRow, MergeClaim, NewFragment};
use async_trait::async_trait;

/// Repository for fragment operations.
#[async_trait]
pub trait FragmentRepo: Send + Sync {
    /// Insert a fragment and return its assigned id.
    async fn create_fragment(&self, fragment: &NewFragment) -> MetadataResult<i64>;

    /// Get a fragment by id.
    async fn get_fragment(&self, fragment_id: i64) -> MetadataResult<Option<FragmentRow>>;

    /// Claim a fragment for merging.
    ///
    /// In one transaction with the fragment row locked: load the chunk rows,
    /// run [`check_merge_claim`] and, if it passes, set `merging` and
    /// `merge_started_at = now`. Nothing is mutated when a check fails.
    async fn begin_merge(&self, fragment_id: i64, total: i64, now: i64)
    -> MetadataResult<MergeClaim>;

    /// Reset a merge claim after a failed merge.
    async fn end_merge(&self, fragment_id: i64) -> MetadataResult<()>;

    /// Delete a fragment and all of its chunk rows in one transaction.
    ///
    /// Returns the number of fragment rows deleted. Fails with `NotFound`
    /// if the fragment does not exist.
    async fn delete_fragment(&self, fragment_id: i64) -> MetadataResult<u64>;

    /// Reset every merge claim taken before `older_than` and return the
    /// affected fragment ids.
    async fn release_stale_merges(&self, older_than: i64) -> MetadataResult<Vec<i64>>;
}

/// Check that a locked fragment may be merged from `chunks` into `total` parts.
///
/// `chunks` must be ordered by number. Checks run in order: claim state,
/// emptiness, count, then adjacency of sequence numbers.
pub fn check_merge_claim(
    fragment: &FragmentRow,
    chunks: &[ChunkRow],
    total: i64,
) -> MetadataResult<()> {
    let fragment_id = fragment.id;

    if fragment.merging {
        return Err(MetadataError::MergeInProgress { fragment_id });
    }
    if chunks.is_empty() {
        return Err(MetadataError::NoChunks { fragment_id });
    }

    let actual = chunks.len() as i64;
    if actual != total {
        return Err(MetadataError::ChunkCountMismatch {
            fragment_id,
            expected: total,
            actual,
        });
    }

    if let Some(pair) = chunks
        .windows(2)
        .find(|pair| pair[1].number != pair[0].number + 1)
    {
        return Err(MetadataError::ChunksNotContiguous {
            fragment_id,
            previous: pair[0].number,
            found: pair[1].number,
        });
    }

    Ok(())
}
