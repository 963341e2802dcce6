//! Database models mapping to the metadata schema.

use mosaic_core::{ChunkInfo, FragmentInfo};
use sqlx::FromRow;

/// Fragment record: one logical file being assembled from chunks.
#[derive(Debug, Clone, FromRow)]
pub struct FragmentRow {
    pub id: i64,
    pub user_id: i64,
    pub file_id: i64,
    pub path: String,
    /// Chunk count, recomputed on every chunk write.
    pub number: i64,
    /// Total chunk bytes, recomputed on every chunk write.
    pub size: i64,
    pub merging: bool,
    pub merge_started_at: Option<i64>,
    pub create_time: i64,
}

impl From<FragmentRow> for FragmentInfo {
    fn from(row: FragmentRow) -> Self {
        FragmentInfo {
            id: row.id,
            user_id: row.user_id,
            file_id: row.file_id,
            path: row.path,
            number: row.number,
            size: row.size,
            merging: row.merging,
            merge_started_at: row.merge_started_at,
            create_time: row.create_time,
        }
    }
}

/// Values for inserting a new fragment. Counters start at zero.
#[derive(Debug, Clone)]
pub struct NewFragment {
    pub user_id: i64,
    pub file_id: i64,
    pub path: String,
    pub create_time: i64,
}

/// Chunk record keyed by the deterministic chunk id.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub id: String,
    pub fragment_id: i64,
    pub number: i64,
    pub size: i64,
    pub create_time: i64,
}

impl From<ChunkRow> for ChunkInfo {
    fn from(row: ChunkRow) -> Self {
        ChunkInfo {
            id: row.id,
            fragment_id: row.fragment_id,
            number: row.number,
            size: row.size,
            create_time: row.create_time,
        }
    }
}

/// Result of a successful merge claim.
#[derive(Debug, Clone)]
pub struct MergeClaim {
    /// Fragment snapshot taken inside the claiming transaction.
    pub fragment: FragmentRow,
    /// Chunk rows ordered by number ascending.
    pub chunks: Vec<ChunkRow>,
}
