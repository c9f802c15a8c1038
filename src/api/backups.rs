//! Backup API endpoints. Backups are read-only.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{index_request, search_request, ApiResult, IndexParams};
use crate::access::Requester;
use crate::models::{CollectionBackup, FormBackup};
use crate::query::Listing;
use crate::schema::ModelName;
use crate::AppState;

/// GET /api/formbackups
pub async fn list_form_backups(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<FormBackup>> {
    let (query, paginator) =
        index_request(ModelName::FormBackup, &params, state.config.max_items_per_page)?;
    let backups = state
        .repo
        .search_form_backups(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(backups))
}

/// POST /api/formbackups/search
pub async fn search_form_backups(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Listing<FormBackup>> {
    let (query, paginator) =
        search_request(ModelName::FormBackup, &body, state.config.max_items_per_page)?;
    let backups = state
        .repo
        .search_form_backups(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(backups))
}

/// GET /api/formbackups/:id
pub async fn get_form_backup(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<FormBackup> {
    Ok(Json(state.repo.get_form_backup(id, &requester).await?))
}

/// GET /api/collectionbackups
pub async fn list_collection_backups(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<CollectionBackup>> {
    let (query, paginator) = index_request(
        ModelName::CollectionBackup,
        &params,
        state.config.max_items_per_page,
    )?;
    let backups = state
        .repo
        .search_collection_backups(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(backups))
}

/// POST /api/collectionbackups/search
pub async fn search_collection_backups(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Listing<CollectionBackup>> {
    let (query, paginator) = search_request(
        ModelName::CollectionBackup,
        &body,
        state.config.max_items_per_page,
    )?;
    let backups = state
        .repo
        .search_collection_backups(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(backups))
}

/// GET /api/collectionbackups/:id
pub async fn get_collection_backup(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<CollectionBackup> {
    Ok(Json(state.repo.get_collection_backup(id, &requester).await?))
}
