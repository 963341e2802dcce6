//! Chunk numbering, deterministic chunk ids and the temp-disk layout.
//!
//! Chunks live at `parts/<fragment_id>/<number>.part` relative to the temp
//! disk root. External uploaders depend on this layout, so it must not change.

use crate::hash::ContentHash;
use crate::{PART_EXTENSION, PARTS_DIR};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated 1-based chunk sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkNumber(u32);

impl ChunkNumber {
    /// Validate a caller-supplied sequence number against `[1, max]`.
    pub fn new(number: i64, max: u32) -> crate::Result<Self> {
        if number < 1 || number > i64::from(max) {
            return Err(crate::Error::ChunkNumberOutOfRange { number, max });
        }
        Ok(Self(number as u32))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChunkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identifier of the chunk at `(fragment_id, number)`.
///
/// Re-uploading the same position yields the same id, so the row store
/// replaces the previous row instead of adding a second one.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(ContentHash);

impl ChunkId {
    /// Compute the id for a chunk position.
    pub fn compute(fragment_id: i64, number: ChunkNumber) -> Self {
        // The separator keeps (1, 12) and (11, 2) apart.
        let key = format!("{fragment_id}:{number}");
        Self(ContentHash::compute(key.as_bytes()))
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Directory holding every chunk of a fragment.
pub fn fragment_dir(fragment_id: i64) -> String {
    format!("{PARTS_DIR}/{fragment_id}")
}

/// File name of the chunk with the given sequence number.
pub fn chunk_file_name(number: ChunkNumber) -> String {
    format!("{number}.{PART_EXTENSION}")
}

/// Full temp-disk key of a chunk.
pub fn chunk_key(fragment_id: i64, number: ChunkNumber) -> String {
    format!("{}/{}", fragment_dir(fragment_id), chunk_file_name(number))
}

/// Metadata about a stored chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Deterministic chunk id (hex).
    pub id: String,
    /// Owning fragment.
    pub fragment_id: i64,
    /// 1-based sequence number.
    pub number: i64,
    /// Size in bytes.
    pub size: i64,
    /// Unix timestamp of the last write.
    pub create_time: i64,
}
