//! Fragment types: destination paths and row snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// A validated destination path for a merged fragment.
///
/// The path is relative to the destination disk, made only of plain
/// components, and must carry both a file stem and an extension
/// (`video/intro.mp4`, not `video/intro`, `.mp4`, `/etc/x.mp4` or
/// `../x.mp4`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentPath(String);

impl FragmentPath {
    /// Parse and validate a destination path.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::EmptyFragmentPath);
        }

        let path = Path::new(trimmed);
        let relative = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let has_stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| !stem.is_empty() && !stem.starts_with('.'));
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| !ext.is_empty());

        if !relative || !has_stem || !has_extension {
            return Err(crate::Error::InvalidFragmentPath(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FragmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FragmentPath({})", self.0)
    }
}

impl fmt::Display for FragmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a fragment row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentInfo {
    pub id: i64,
    pub user_id: i64,
    /// Finished-file record this fragment belongs to (0 if none).
    pub file_id: i64,
    /// Destination path on the destination disk.
    pub path: String,
    /// Number of chunks currently stored.
    pub number: i64,
    /// Total bytes currently stored.
    pub size: i64,
    pub merging: bool,
    /// Unix timestamp at which the current merge claim was taken.
    pub merge_started_at: Option<i64>,
    pub create_time: i64,
}
