//! File API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{decode, index_request, require_writer, search_request, ApiResult, IndexParams};
use crate::access::Requester;
use crate::models::{File, FileInput};
use crate::query::Listing;
use crate::schema::ModelName;
use crate::AppState;

/// GET /api/files - List visible files.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<File>> {
    let (query, paginator) =
        index_request(ModelName::File, &params, state.config.max_items_per_page)?;
    let files = state
        .repo
        .search_files(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(files))
}

/// POST /api/files/search - Search files.
pub async fn search_files(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Listing<File>> {
    let (query, paginator) =
        search_request(ModelName::File, &body, state.config.max_items_per_page)?;
    let files = state
        .repo
        .search_files(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(files))
}

/// POST /api/files - Create file metadata.
pub async fn create_file(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<File> {
    require_writer(&requester)?;
    let input: FileInput = decode(&body)?;
    Ok(Json(state.repo.create_file(&input, &requester).await?))
}

/// GET /api/files/:id - Get a file.
pub async fn get_file(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<File> {
    Ok(Json(state.repo.get_file(id, &requester).await?))
}

/// PUT /api/files/:id - Update a file.
pub async fn update_file(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<File> {
    require_writer(&requester)?;
    let input: FileInput = decode(&body)?;
    Ok(Json(state.repo.update_file(id, &input, &requester).await?))
}

/// DELETE /api/files/:id - Delete a file.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<File> {
    require_writer(&requester)?;
    Ok(Json(state.repo.delete_file(id, &requester).await?))
}
