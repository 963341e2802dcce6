//! Fragment lifecycle: creation, inspection, deletion and merge.
//!
//! A merge runs in three phases:
//! 1. Claim: under the fragment lock, validate the chunk set and set
//!    `merging` in one row-store transaction.
//! 2. Concatenate: with no lock held, check each chunk file against its
//!    recorded size, then stream every chunk in order into a writer on the
//!    destination disk.
//! 3. Under the fragment lock again, either delete the fragment (success)
//!    or reset the claim (failure).
//!
//! Phases 2 and 3 run on a spawned task, independent of the caller.

use crate::error::{UploadError, UploadResult};
use crate::{Shared, check_fragment_id};
use futures::StreamExt;
use mosaic_core::{ChunkInfo, ChunkNumber, FragmentInfo, FragmentPath, chunk_key, fragment_dir};
use mosaic_metadata::{MergeClaim, NewFragment};
use mosaic_storage::StreamingUpload;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, instrument};

/// Fragment bookkeeping and the merge engine.
#[derive(Clone)]
pub struct FragmentStore {
    shared: Arc<Shared>,
}

impl FragmentStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Register a new fragment that will be merged to `path`.
    #[instrument(skip(self))]
    pub async fn create(&self, user_id: i64, path: &str, file_id: i64) -> UploadResult<i64> {
        let path = FragmentPath::parse(path)?;

        let fragment_id = self
            .shared
            .metadata
            .create_fragment(&NewFragment {
                user_id,
                file_id,
                path: path.to_string(),
                create_time: mosaic_core::unix_now(),
            })
            .await?;

        tracing::info!(fragment_id, user_id, path = %path, "Created fragment");
        Ok(fragment_id)
    }

    /// Current snapshot of a fragment.
    pub async fn get(&self, fragment_id: i64) -> UploadResult<Option<FragmentInfo>> {
        check_fragment_id(fragment_id)?;
        let row = self.shared.metadata.get_fragment(fragment_id).await?;
        Ok(row.map(Into::into))
    }

    /// Stored chunks of a fragment ordered by number.
    pub async fn list_chunks(&self, fragment_id: i64) -> UploadResult<Vec<ChunkInfo>> {
        check_fragment_id(fragment_id)?;
        if self.shared.metadata.get_fragment(fragment_id).await?.is_none() {
            return Err(UploadError::fragment_not_found(fragment_id));
        }
        let rows = self.shared.metadata.list_chunks(fragment_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete a fragment, its chunk rows and its chunk directory.
    ///
    /// Returns the number of fragment rows deleted. A failure to remove the
    /// chunk directory leaves the rows untouched.
    #[instrument(skip(self))]
    pub async fn delete_info(&self, fragment_id: i64) -> UploadResult<u64> {
        check_fragment_id(fragment_id)?;
        let _guard = self.shared.locks.lock(fragment_id).await;
        self.delete_locked(fragment_id).await
    }

    /// Caller must hold the fragment lock.
    async fn delete_locked(&self, fragment_id: i64) -> UploadResult<u64> {
        if self.shared.metadata.get_fragment(fragment_id).await?.is_none() {
            return Err(UploadError::fragment_not_found(fragment_id));
        }

        let dir = fragment_dir(fragment_id);
        self.shared
            .temp
            .delete_prefix(&dir)
            .await
            .map_err(|e| UploadError::storage(format!("fragment {fragment_id}: delete {dir}"), e))?;

        let deleted = self.shared.metadata.delete_fragment(fragment_id).await?;
        tracing::info!(fragment_id, "Deleted fragment");
        Ok(deleted)
    }

    /// Reset a merge claim left behind by a crashed or failed merge.
    ///
    /// Returns the fragment after the reset; releasing an unclaimed fragment
    /// is a no-op.
    #[instrument(skip(self))]
    pub async fn release(&self, fragment_id: i64) -> UploadResult<FragmentInfo> {
        check_fragment_id(fragment_id)?;
        let _guard = self.shared.locks.lock(fragment_id).await;

        let fragment = self
            .shared
            .metadata
            .get_fragment(fragment_id)
            .await?
            .ok_or_else(|| UploadError::fragment_not_found(fragment_id))?;
        if !fragment.merging {
            return Ok(fragment.into());
        }

        self.shared.metadata.end_merge(fragment_id).await?;
        tracing::warn!(fragment_id, "Released merge claim");

        let fragment = self
            .shared
            .metadata
            .get_fragment(fragment_id)
            .await?
            .ok_or_else(|| UploadError::fragment_not_found(fragment_id))?;
        Ok(fragment.into())
    }

    /// Merge the fragment's `total` chunks into its destination path.
    ///
    /// Returns the fragment snapshot taken when the merge was claimed. On
    /// success the fragment, its chunk rows and its chunk files are gone.
    /// Once claimed, the merge runs to completion even if the returned
    /// future is dropped.
    #[instrument(skip(self))]
    pub async fn merge(&self, fragment_id: i64, total: i64) -> UploadResult<FragmentInfo> {
        check_fragment_id(fragment_id)?;

        let claim = {
            let _guard = self.shared.locks.lock(fragment_id).await;
            self.shared
                .metadata
                .begin_merge(fragment_id, total, mosaic_core::unix_now())
                .await?
        };

        // Phases 2 and 3 run on their own task, so a caller that goes away
        // mid-merge still leaves the fragment merged or released.
        let store = self.clone();
        let task = tokio::spawn(async move { store.finish_merge(claim).await }.in_current_span());
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(fragment_id, error = %e, "Merge task ended abnormally");
                Err(UploadError::MergeAborted {
                    fragment_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Concatenate a claimed fragment, then delete it or release the claim.
    async fn finish_merge(&self, claim: MergeClaim) -> UploadResult<FragmentInfo> {
        let fragment_id = claim.fragment.id;
        let started = Instant::now();
        let result = self.concatenate(&claim).await;

        let _guard = self.shared.locks.lock(fragment_id).await;
        match result {
            Ok(bytes) => {
                tracing::info!(
                    fragment_id,
                    path = %claim.fragment.path,
                    chunks = claim.chunks.len(),
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Merged fragment"
                );
                if let Err(e) = self.delete_locked(fragment_id).await {
                    tracing::warn!(
                        fragment_id,
                        error = %e,
                        "Merged file written but fragment cleanup failed"
                    );
                }
                Ok(claim.fragment.into())
            }
            Err(original) => {
                tracing::warn!(fragment_id, error = %original, "Merge failed, releasing claim");
                match self.shared.metadata.end_merge(fragment_id).await {
                    Ok(()) => Err(original),
                    Err(recovery) => {
                        tracing::error!(
                            fragment_id,
                            error = %original,
                            recovery_error = %recovery,
                            "Failed to release merge claim; fragment stays claimed"
                        );
                        Err(UploadError::RecoveryFailed {
                            fragment_id,
                            original: Box::new(original),
                            recovery,
                        })
                    }
                }
            }
        }
    }

    /// Stream every claimed chunk into the destination file.
    ///
    /// The writer is finished on success and aborted on failure.
    async fn concatenate(&self, claim: &MergeClaim) -> UploadResult<u64> {
        let fragment_id = claim.fragment.id;
        let path = &claim.fragment.path;

        self.verify_chunk_files(claim).await?;

        let mut writer = self.shared.dest.put_stream(path).await.map_err(|e| {
            UploadError::storage(format!("fragment {fragment_id}: open destination {path}"), e)
        })?;

        let copied = self.copy_chunks(claim, writer.as_mut()).await;
        match copied {
            Ok(()) => writer.finish().await.map_err(|e| {
                UploadError::storage(
                    format!("fragment {fragment_id}: finish destination {path}"),
                    e,
                )
            }),
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(
                        fragment_id,
                        path = %path,
                        error = %abort_err,
                        "Failed to abort destination writer"
                    );
                }
                Err(e)
            }
        }
    }

    /// Check every chunk file against its recorded size before the
    /// destination is opened.
    async fn verify_chunk_files(&self, claim: &MergeClaim) -> UploadResult<()> {
        let fragment_id = claim.fragment.id;

        for chunk in &claim.chunks {
            let number = ChunkNumber::new(chunk.number, u32::MAX)?;
            let key = chunk_key(fragment_id, number);

            let meta = self.shared.temp.head(&key).await.map_err(|e| {
                UploadError::storage(format!("fragment {fragment_id} chunk {number}: stat {key}"), e)
            })?;
            if i64::try_from(meta.size).ok() != Some(chunk.size) {
                return Err(UploadError::ChunkSizeMismatch {
                    fragment_id,
                    number: chunk.number,
                    key,
                    expected: chunk.size,
                    actual: meta.size,
                });
            }
        }

        Ok(())
    }

    async fn copy_chunks(
        &self,
        claim: &MergeClaim,
        writer: &mut dyn StreamingUpload,
    ) -> UploadResult<()> {
        let fragment_id = claim.fragment.id;
        let path = &claim.fragment.path;

        for chunk in &claim.chunks {
            let number = ChunkNumber::new(chunk.number, u32::MAX)?;
            let key = chunk_key(fragment_id, number);

            let mut stream = self.shared.temp.get_stream(&key).await.map_err(|e| {
                UploadError::storage(format!("fragment {fragment_id} chunk {number}: open {key}"), e)
            })?;

            while let Some(block) = stream.next().await {
                let block = block.map_err(|e| {
                    UploadError::storage(
                        format!("fragment {fragment_id} chunk {number}: read {key}"),
                        e,
                    )
                })?;
                writer.write(block).await.map_err(|e| {
                    UploadError::storage(
                        format!("fragment {fragment_id} chunk {number}: write destination {path}"),
                        e,
                    )
                })?;
            }
        }

        Ok(())
    }
}
