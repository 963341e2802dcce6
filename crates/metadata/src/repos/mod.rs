//! Repository traits for metadata operations.

pub mod chunks;
pub mod fragments;

pub use chunks::{ChunkRepo, ChunkWrite};
pub use fragments::{FragmentRepo, check_merge_claim};
