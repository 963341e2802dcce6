//! HTTP API server for Mosaic.
//!
//! This crate provides the HTTP surface of the upload pipeline:
//! - Fragment creation, status and chunk listing
//! - Raw-body chunk uploads
//! - Merge, operator release and delete
//! - Health and Prometheus endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
