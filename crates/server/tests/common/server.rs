//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use mosaic_core::config::AppConfig;
use mosaic_metadata::MetadataStore;
use mosaic_server::{AppState, create_router};
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server over temp directories and a SQLite row store.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing(temp_dir.path());
        modifier(&mut config);

        let temp = mosaic_storage::from_config(&config.temp_storage)
            .await
            .expect("Failed to create temp storage");
        let storage = mosaic_storage::from_config(&config.storage)
            .await
            .expect("Failed to create storage");
        let metadata = mosaic_metadata::from_config(&config.metadata)
            .await
            .expect("Failed to create metadata store");

        let state = AppState::new(config, temp, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            temp_dir,
        }
    }

    pub fn metadata(&self) -> std::sync::Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Path of a merged file on the destination disk.
    pub fn storage_path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join("storage").join(relative)
    }

    /// Path of a fragment's chunk directory on the temp disk.
    pub fn fragment_dir_path(&self, fragment_id: i64) -> PathBuf {
        self.temp_dir
            .path()
            .join("temp")
            .join("parts")
            .join(fragment_id.to_string())
    }

    /// Send a JSON request (or an empty body) and decode the JSON response.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    /// Upload raw chunk bytes.
    pub async fn put_chunk(
        &self,
        fragment_id: i64,
        number: i64,
        data: Vec<u8>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/v1/fragments/{fragment_id}/chunks/{number}"))
            .header("Content-Type", "application/octet-stream")
            .body(Body::from(data))
            .unwrap();

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }
}
