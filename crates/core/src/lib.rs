//! Core domain types and shared logic for the Mosaic fragment upload service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Fragment destination paths and fragment snapshots
//! - Chunk sequence numbers, deterministic chunk ids and the on-disk layout
//! - Merge state machine
//! - Configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod fragment;
pub mod hash;

pub use chunk::{ChunkId, ChunkInfo, ChunkNumber, chunk_file_name, chunk_key, fragment_dir};
pub use error::{Error, Result};
pub use fragment::{FragmentInfo, FragmentPath};
pub use hash::ContentHash;

/// Default upper bound for chunk sequence numbers.
pub const DEFAULT_MAX_CHUNK_NUMBER: u32 = 10_000;

/// Root directory (on the temp disk) under which chunk directories live.
pub const PARTS_DIR: &str = "parts";

/// File extension of a stored chunk.
pub const PART_EXTENSION: &str = "part";

/// Current wall-clock time as a unix timestamp in seconds.
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
