//! Fault-injecting wrappers around the disk and the row store.

use async_trait::async_trait;
use bytes::Bytes;
use mosaic_metadata::{
    ChunkRepo, ChunkRow, ChunkWrite, FragmentRepo, FragmentRow, MergeClaim, MetadataError,
    MetadataResult, MetadataStore, NewFragment,
};
use mosaic_storage::{ByteStream, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn injected(what: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("injected fault: {what}")))
}

/// Disk wrapper that fails reads or writes of selected keys.
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    fail_delete_prefix: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    pub stream_opens: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            failing_reads: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
            fail_delete_prefix: AtomicBool::new(false),
            read_delay: Mutex::new(None),
            stream_opens: AtomicUsize::new(0),
        }
    }

    /// Streams of `key` yield one block, then an error.
    pub fn fail_reads_of(&self, key: &str) {
        self.failing_reads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_writes_of(&self, key: &str) {
        self.failing_writes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_delete_prefix(&self, fail: bool) {
        self.fail_delete_prefix.store(fail, Ordering::SeqCst);
    }

    /// Every stream open waits `delay` first.
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn heal(&self) {
        self.failing_reads.lock().unwrap().clear();
        self.failing_writes.lock().unwrap().clear();
        *self.read_delay.lock().unwrap() = None;
        self.fail_delete_prefix(false);
    }

    fn read_fails(&self, key: &str) -> bool {
        self.failing_reads.lock().unwrap().contains(key)
    }

    fn write_fails(&self, key: &str) -> bool {
        self.failing_writes.lock().unwrap().contains(key)
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.read_fails(key) {
            let items: Vec<StorageResult<Bytes>> =
                vec![Ok(Bytes::from_static(b"partial")), Err(injected(key))];
            return Ok(Box::pin(futures::stream::iter(items)));
        }
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if self.write_fails(key) {
            return Err(injected(key));
        }
        self.inner.put(key, data).await
    }

    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<u64> {
        if self.write_fails(key) {
            return Err(injected(key));
        }
        self.inner.put_file(key, source).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        if self.write_fails(key) {
            return Err(injected(key));
        }
        self.inner.put_stream(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<bool> {
        if self.fail_delete_prefix.load(Ordering::SeqCst) {
            return Err(injected(prefix));
        }
        self.inner.delete_prefix(prefix).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

/// Row-store wrapper whose claim reset can be made to fail, and which can
/// act as a second process claiming a merge.
pub struct FaultyMetadata {
    inner: Arc<dyn MetadataStore>,
    fail_end_merge: AtomicBool,
    claim_before_chunk_write: AtomicBool,
}

#[allow(dead_code)]
impl FaultyMetadata {
    pub fn new(inner: Arc<dyn MetadataStore>) -> Self {
        Self {
            inner,
            fail_end_merge: AtomicBool::new(false),
            claim_before_chunk_write: AtomicBool::new(false),
        }
    }

    pub fn fail_end_merge(&self, fail: bool) {
        self.fail_end_merge.store(fail, Ordering::SeqCst);
    }

    /// Claim the fragment for a merge, over all its current chunks, just
    /// before the next chunk write reaches the row store.
    pub fn claim_before_next_chunk_write(&self) {
        self.claim_before_chunk_write.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FragmentRepo for FaultyMetadata {
    async fn create_fragment(&self, fragment: &NewFragment) -> MetadataResult<i64> {
        self.inner.create_fragment(fragment).await
    }

    async fn get_fragment(&self, fragment_id: i64) -> MetadataResult<Option<FragmentRow>> {
        self.inner.get_fragment(fragment_id).await
    }

    async fn begin_merge(
        &self,
        fragment_id: i64,
        total: i64,
        now: i64,
    ) -> MetadataResult<MergeClaim> {
        self.inner.begin_merge(fragment_id, total, now).await
    }

    async fn end_merge(&self, fragment_id: i64) -> MetadataResult<()> {
        if self.fail_end_merge.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal("injected fault: end_merge".into()));
        }
        self.inner.end_merge(fragment_id).await
    }

    async fn delete_fragment(&self, fragment_id: i64) -> MetadataResult<u64> {
        self.inner.delete_fragment(fragment_id).await
    }

    async fn release_stale_merges(&self, older_than: i64) -> MetadataResult<Vec<i64>> {
        self.inner.release_stale_merges(older_than).await
    }
}

#[async_trait]
impl ChunkRepo for FaultyMetadata {
    async fn begin_chunk(&self, fragment_id: i64) -> MetadataResult<Box<dyn ChunkWrite>> {
        if self.claim_before_chunk_write.swap(false, Ordering::SeqCst)
            && let Some(fragment) = self.inner.get_fragment(fragment_id).await?
        {
            self.inner
                .begin_merge(fragment_id, fragment.number, mosaic_core::unix_now())
                .await?;
        }
        self.inner.begin_chunk(fragment_id).await
    }

    async fn list_chunks(&self, fragment_id: i64) -> MetadataResult<Vec<ChunkRow>> {
        self.inner.list_chunks(fragment_id).await
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
