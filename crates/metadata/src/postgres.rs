//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{ChunkRow, FragmentRow, MergeClaim, NewFragment};
use crate::repos::{ChunkRepo, ChunkWrite, FragmentRepo, check_merge_claim};
use crate::store::MetadataStore;
use async_trait::async_trait;
use mosaic_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres, Transaction};
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the embedded schema into executable statements, skipping
/// comment-only fragments.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|statement| {
            statement.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            })
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a full connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from
    /// the environment.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// Load a fragment row with `FOR UPDATE`, holding its lock until commit.
async fn lock_fragment(
    tx: &mut Transaction<'_, Postgres>,
    fragment_id: i64,
) -> MetadataResult<FragmentRow> {
    sqlx::query_as::<_, FragmentRow>("SELECT * FROM fragments WHERE id = $1 FOR UPDATE")
        .bind(fragment_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| MetadataError::fragment_not_found(fragment_id))
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold more than one command.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FragmentRepo for PostgresStore {
    async fn create_fragment(&self, fragment: &NewFragment) -> MetadataResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO fragments (user_id, file_id, path, number, size, merging, create_time)
             VALUES ($1, $2, $3, 0, 0, FALSE, $4)
             RETURNING id",
        )
        .bind(fragment.user_id)
        .bind(fragment.file_id)
        .bind(&fragment.path)
        .bind(fragment.create_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_fragment(&self, fragment_id: i64) -> MetadataResult<Option<FragmentRow>> {
        let row = sqlx::query_as::<_, FragmentRow>("SELECT * FROM fragments WHERE id = $1")
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
            "SELECT * FROM fragment_chunks WHERE fragment_id = $1 ORDER BY number ASC",
        )
        .bind(fragment_id)
        .fetch_all(&mut *tx)
        .await?;

        check_merge_claim(&fragment, &chunks, total)?;

        sqlx::query("UPDATE fragments SET merging = TRUE, merge_started_at = $1 WHERE id = $2")
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
        sqlx::query("UPDATE fragments SET merging = FALSE, merge_started_at = NULL WHERE id = $1")
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_fragment(&self, fragment_id: i64) -> MetadataResult<u64> {
        let mut tx = self.pool.begin().await?;
        lock_fragment(&mut tx, fragment_id).await?;

        sqlx::query("DELETE FROM fragment_chunks WHERE fragment_id = $1")
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM fragments WHERE id = $1")
            .bind(fragment_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    async fn release_stale_merges(&self, older_than: i64) -> MetadataResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "UPDATE fragments SET merging = FALSE, merge_started_at = NULL
             WHERE merging AND (merge_started_at IS NULL OR merge_started_at < $1)
             RETURNING id",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl ChunkRepo for PostgresStore {
    async fn begin_chunk(&self, fragment_id: i64) -> MetadataResult<Box<dyn ChunkWrite>> {
        let mut tx = self.pool.begin().await?;
        let fragment = lock_fragment(&mut tx, fragment_id).await?;
        if fragment.merging {
            return Err(MetadataError::MergeInProgress { fragment_id });
        }
        Ok(Box::new(PgChunkWrite { tx, fragment }))
    }

    async fn list_chunks(&self, fragment_id: i64) -> MetadataResult<Vec<ChunkRow>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM fragment_chunks WHERE fragment_id = $1 ORDER BY number ASC",
        )
        .bind(fragment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Chunk write holding a `FOR UPDATE` row lock.
struct PgChunkWrite {
    tx: Transaction<'static, Postgres>,
    fragment: FragmentRow,
}

#[async_trait]
impl ChunkWrite for PgChunkWrite {
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
            "INSERT INTO fragment_chunks (id, fragment_id, number, size, create_time)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE
             SET size = EXCLUDED.size, create_time = EXCLUDED.create_time",
        )
        .bind(&chunk.id)
        .bind(chunk.fragment_id)
        .bind(chunk.number)
        .bind(chunk.size)
        .bind(chunk.create_time)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, FragmentRow>(
            "UPDATE fragments SET
                 number = (SELECT COUNT(*) FROM fragment_chunks WHERE fragment_id = $1),
                 size = (SELECT COALESCE(SUM(size), 0)::BIGINT FROM fragment_chunks WHERE fragment_id = $1)
             WHERE id = $1
             RETURNING *",
        )
        .bind(chunk.fragment_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }
}
