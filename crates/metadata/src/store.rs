//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{ChunkRow, FragmentRow, MergeClaim, NewFragment};
use crate::repos::{ChunkRepo, ChunkWrite, FragmentRepo, check_merge_claim};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FragmentRepo + ChunkRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// The pool holds a single connection, so transactions are serialized and a
/// write at the start of a transaction takes the database write lock.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store and apply the schema.
    pub async fn new(path: impl AsRef<Path>, busy_timeout_secs: Option<u64>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(busy_timeout_secs.unwrap_or(30)));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Take the write lock on a fragment row and load it.
///
/// SQLite has no row locks; the no-op UPDATE promotes the transaction to a
/// writer so nobody else can change the row until commit.
async fn lock_fragment(
    tx: &mut Transaction<'_, Sqlite>,
    fragment_id: i64,
) -> MetadataResult<FragmentRow> {
    let locked = sqlx::query("UPDATE fragments SET id = id WHERE id = ?")
        .bind(fragment_id)
        .execute(&mut **tx)
        .await?;
    if locked.rows_affected() == 0 {
        return Err(MetadataError::fragment_not_found(fragment_id));
    }

    let row = sqlx::query_as::<_, FragmentRow>("SELECT * FROM fragments WHERE id = ?")
        .bind(fragment_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row)
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FragmentRepo for SqliteStore {
    async fn create_fragment(&self, fragment: &NewFragment) -> MetadataResult<i64> {
        let result = sqlx::query(
            "INSERT INTO fragments (user_id, file_id, path, number, size, merging, create_time)
             VALUES (?, ?, ?, 0, 0, 0, ?)",
        )
        .bind(fragment.user_id)
        .bind(fragment.file_id)
        .bind(&fragment.path)
        .bind(fragment.create_time)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_fragment(&self, fragment_id: i64) -> MetadataResult<Option<FragmentRow>> {
        let row = sqlx::query_as::<_, FragmentRow>("SELECT * FROM fragments WHERE id = ?")
            .bind(fragment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn begin_merge(
        &self,
        fragment_id: i64,
        total: i64,
        now: i64,
    ) -> MetadataResult<MergeClaim> {
        let mut tx = self.pool.begin().await?;
        let mut fragment = lock_fragment(&mut tx, fragment_id).await?;

        let chunks = sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM fragment_chunks WHERE fragment_id = ? ORDER BY number ASC",
        )
        .bind(fragment_id)
        .fetch_all(&mut *tx)
        .await?;

        // Dropping the transaction on error rolls it back.
        check_merge_claim(&fragment, &chunks, total)?;

        sqlx::query("UPDATE fragments SET merging = 1, merge_started_at = ? WHERE id = ?")
            .bind(now)
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        fragment.merging = true;
        fragment.merge_started_at = Some(now);
        Ok(MergeClaim { fragment, chunks })
    }

    async fn end_merge(&self, fragment_id: i64) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_fragment(&mut tx, fragment_id).await?;
        sqlx::query("UPDATE fragments SET merging = 0, merge_started_at = NULL WHERE id = ?")
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_fragment(&self, fragment_id: i64) -> MetadataResult<u64> {
        let mut tx = self.pool.begin().await?;
        lock_fragment(&mut tx, fragment_id).await?;

        sqlx::query("DELETE FROM fragment_chunks WHERE fragment_id = ?")
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM fragments WHERE id = ?")
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    async fn release_stale_merges(&self, older_than: i64) -> MetadataResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "UPDATE fragments SET merging = 0, merge_started_at = NULL
             WHERE merging = 1 AND (merge_started_at IS NULL OR merge_started_at < ?)
             RETURNING id",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl ChunkRepo for SqliteStore {
    async fn begin_chunk(&self, fragment_id: i64) -> MetadataResult<Box<dyn ChunkWrite>> {
        let mut tx = self.pool.begin().await?;
        let fragment = lock_fragment(&mut tx, fragment_id).await?;
        if fragment.merging {
            return Err(MetadataError::MergeInProgress { fragment_id });
        }
        Ok(Box::new(SqliteChunkWrite { tx, fragment }))
    }

    async fn list_chunks(&self, fragment_id: i64) -> MetadataResult<Vec<ChunkRow>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM fragment_chunks WHERE fragment_id = ? ORDER BY number ASC",
        )
        .bind(fragment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Chunk write holding the SQLite write lock.
struct SqliteChunkWrite {
    tx: Transaction<'static, Sqlite>,
    fragment: FragmentRow,
}

#[async_trait]
impl ChunkWrite for SqliteChunkWrite {
    fn fragment(&self) -> &FragmentRow {
        &self.fragment
    }

    async fn commit(self: Box<Self>, chunk: &ChunkRow) -> MetadataResult<FragmentRow> {
        let Self { mut tx, fragment } = *self;
        if chunk.fragment_id != fragment.id {
            return Err(MetadataError::Internal(format!(
                "chunk {} belongs to fragment {}, not locked fragment {}",
                chunk.id, chunk.fragment_id, fragment.id
            )));
        }

        sqlx::query(
            "INSERT OR REPLACE INTO fragment_chunks (id, fragment_id, number, size, create_time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(chunk.fragment_id)
        .bind(chunk.number)
        .bind(chunk.size)
        .bind(chunk.create_time)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE fragments SET
                 number = (SELECT COUNT(*) FROM fragment_chunks WHERE fragment_id = ?1),
                 size = (SELECT COALESCE(SUM(size), 0) FROM fragment_chunks WHERE fragment_id = ?1)
             WHERE id = ?1",
        )
        .bind(chunk.fragment_id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, FragmentRow>("SELECT * FROM fragments WHERE id = ?")
            .bind(chunk.fragment_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS fragments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL DEFAULT 0,
    path TEXT NOT NULL,
    number INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    merging INTEGER NOT NULL DEFAULT 0,
    merge_started_at INTEGER,
    create_time INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_fragments_merging ON fragments(merging, merge_started_at);

CREATE TABLE IF NOT EXISTS fragment_chunks (
    id TEXT PRIMARY KEY,
    fragment_id INTEGER NOT NULL REFERENCES fragments(id) ON DELETE CASCADE,
    number INTEGER NOT NULL,
    size INTEGER NOT NULL,
    create_time INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_fragment_chunks_position
    ON fragment_chunks(fragment_id, number);
"#;
