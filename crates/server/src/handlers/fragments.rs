//! Fragment and chunk handlers.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_UPLOADED, CHUNK_UPLOAD_DURATION, CHUNKS_UPLOADED, FRAGMENTS_CREATED, MERGE_DURATION,
    MERGES_COMPLETED, MERGES_FAILED, record_upload_error,
};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use mosaic_core::{ChunkInfo, FragmentInfo};
use mosaic_upload::{ChunkData, UploadError};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Count the error by kind and convert it for the response.
fn track(e: UploadError) -> ApiError {
    record_upload_error(e.kind());
    e.into()
}

/// Request body for `POST /v1/fragments`.
#[derive(Debug, Deserialize)]
pub struct CreateFragmentRequest {
    pub user_id: i64,
    /// Destination path of the merged file, relative to the storage root.
    pub path: String,
    #[serde(default)]
    pub file_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CreateFragmentResponse {
    pub fragment_id: i64,
}

/// POST /v1/fragments - Register a fragment.
#[tracing::instrument(skip(state, req), fields(user_id = req.user_id))]
pub async fn create_fragment(
    State(state): State<AppState>,
    Json(req): Json<CreateFragmentRequest>,
) -> ApiResult<(StatusCode, Json<CreateFragmentResponse>)> {
    let fragment_id = state
        .uploader
        .fragments()
        .create(req.user_id, &req.path, req.file_id)
        .await
        .map_err(track)?;

    FRAGMENTS_CREATED.inc();
    Ok((
        StatusCode::CREATED,
        Json(CreateFragmentResponse { fragment_id }),
    ))
}

/// GET /v1/fragments/{fragment_id}
pub async fn get_fragment(
    State(state): State<AppState>,
    Path(fragment_id): Path<i64>,
) -> ApiResult<Json<FragmentInfo>> {
    let fragment = state
        .uploader
        .fragments()
        .get(fragment_id)
        .await
        .map_err(track)?
        .ok_or_else(|| ApiError::NotFound(format!("fragment {fragment_id}")))?;
    Ok(Json(fragment))
}

/// GET /v1/fragments/{fragment_id}/chunks - Stored chunks in order.
///
/// Clients resuming an interrupted upload use this to skip chunks the
/// server already has.
pub async fn list_chunks(
    State(state): State<AppState>,
    Path(fragment_id): Path<i64>,
) -> ApiResult<Json<Vec<ChunkInfo>>> {
    let chunks = state
        .uploader
        .fragments()
        .list_chunks(fragment_id)
        .await
        .map_err(track)?;
    Ok(Json(chunks))
}

#[derive(Debug, Serialize)]
pub struct UploadChunkResponse {
    pub chunk_id: String,
    pub size: i64,
    /// Fragment with refreshed counters.
    pub fragment: FragmentInfo,
}

/// PUT /v1/fragments/{fragment_id}/chunks/{number} - Store one chunk.
///
/// The request body is the raw chunk content. Uploading the same number
/// again replaces the stored chunk.
#[tracing::instrument(skip(state, body), fields(size = body.len()))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((fragment_id, number)): Path<(i64, i64)>,
    body: Bytes,
) -> ApiResult<Json<UploadChunkResponse>> {
    let started = Instant::now();
    let size = body.len() as u64;

    let receipt = state
        .uploader
        .chunks()
        .create(fragment_id, number, ChunkData::Bytes(body))
        .await
        .map_err(track)?;

    CHUNKS_UPLOADED.inc();
    BYTES_UPLOADED.inc_by(size);
    CHUNK_UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());

    Ok(Json(UploadChunkResponse {
        chunk_id: receipt.chunk_id().to_string(),
        size: receipt.chunk.size,
        fragment: receipt.fragment,
    }))
}

/// Request body for `POST /v1/fragments/{fragment_id}/merge`.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    /// Number of chunks the client uploaded.
    pub total: i64,
}

/// POST /v1/fragments/{fragment_id}/merge - Concatenate the chunks into the
/// destination file.
#[tracing::instrument(skip(state, req), fields(total = req.total))]
pub async fn merge_fragment(
    State(state): State<AppState>,
    Path(fragment_id): Path<i64>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<Json<FragmentInfo>> {
    let started = Instant::now();

    match state.uploader.fragments().merge(fragment_id, req.total).await {
        Ok(fragment) => {
            MERGES_COMPLETED.inc();
            MERGE_DURATION.observe(started.elapsed().as_secs_f64());
            Ok(Json(fragment))
        }
        Err(e) => {
            MERGES_FAILED.inc();
            Err(track(e))
        }
    }
}

/// POST /v1/fragments/{fragment_id}/release - Reset a stuck merge claim.
///
/// Operator endpoint for fragments left claimed by a crashed merge.
#[tracing::instrument(skip(state))]
pub async fn release_fragment(
    State(state): State<AppState>,
    Path(fragment_id): Path<i64>,
) -> ApiResult<Json<FragmentInfo>> {
    let fragment = state
        .uploader
        .fragments()
        .release(fragment_id)
        .await
        .map_err(track)?;
    Ok(Json(fragment))
}

#[derive(Debug, Serialize)]
pub struct DeleteFragmentResponse {
    pub deleted: u64,
}

/// DELETE /v1/fragments/{fragment_id} - Drop a fragment and its chunks.
#[tracing::instrument(skip(state))]
pub async fn delete_fragment(
    State(state): State<AppState>,
    Path(fragment_id): Path<i64>,
) -> ApiResult<Json<DeleteFragmentResponse>> {
    let deleted = state
        .uploader
        .fragments()
        .delete_info(fragment_id)
        .await
        .map_err(track)?;
    Ok(Json(DeleteFragmentResponse { deleted }))
}
