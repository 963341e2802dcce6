//! Uploader wired to temp directories, with fault injection on every seam.

use super::faulty::{FaultyMetadata, FaultyStore};
use mosaic_core::config::UploadConfig;
use mosaic_metadata::{MetadataStore, SqliteStore};
use mosaic_storage::{FilesystemBackend, ObjectStore};
use mosaic_upload::Uploader;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[allow(dead_code)]
pub struct TestUploader {
    pub uploader: Uploader,
    /// Temp disk as the uploader sees it.
    pub temp: Arc<FaultyStore>,
    /// Destination disk as the uploader sees it.
    pub dest: Arc<FaultyStore>,
    pub metadata: Arc<FaultyMetadata>,
    pub config: UploadConfig,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestUploader {
    pub async fn new() -> Self {
        Self::with_config(UploadConfig::default()).await
    }

    pub async fn with_config(config: UploadConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");

        let temp_disk: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(dir.path().join("temp")).await.unwrap());
        let dest_disk: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(dir.path().join("dest")).await.unwrap());
        let sqlite: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(dir.path().join("meta.db"), None).await.unwrap());

        let temp = Arc::new(FaultyStore::new(temp_disk));
        let dest = Arc::new(FaultyStore::new(dest_disk));
        let metadata = Arc::new(FaultyMetadata::new(sqlite));

        let uploader = Uploader::new(temp.clone(), dest.clone(), metadata.clone(), &config);

        Self {
            uploader,
            temp,
            dest,
            metadata,
            config,
            dir,
        }
    }

    /// Path of a chunk file on the temp disk.
    pub fn chunk_path(&self, fragment_id: i64, number: u32) -> PathBuf {
        self.dir
            .path()
            .join("temp")
            .join("parts")
            .join(fragment_id.to_string())
            .join(format!("{number}.part"))
    }

    pub fn fragment_dir_path(&self, fragment_id: i64) -> PathBuf {
        self.dir
            .path()
            .join("temp")
            .join("parts")
            .join(fragment_id.to_string())
    }

    pub fn dest_path(&self, relative: &str) -> PathBuf {
        self.dir.path().join("dest").join(relative)
    }
}
