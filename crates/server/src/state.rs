//! Application state shared across handlers.

use mosaic_core::config::AppConfig;
use mosaic_metadata::MetadataStore;
use mosaic_storage::ObjectStore;
use mosaic_upload::Uploader;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Disk holding chunk files.
    pub temp: Arc<dyn ObjectStore>,
    /// Disk receiving merged files.
    pub storage: Arc<dyn ObjectStore>,
    /// Fragment and chunk rows.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload pipeline over the disks and row store above.
    pub uploader: Uploader,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        temp: Arc<dyn ObjectStore>,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let uploader = Uploader::new(
            temp.clone(),
            storage.clone(),
            metadata.clone(),
            &config.uploads,
        );

        Self {
            config: Arc::new(config),
            temp,
            storage,
            metadata,
            uploader,
        }
    }
}
