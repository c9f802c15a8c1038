//! Collection API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::Value;

use super::{
    decode, index_request, new_search_response, require_writer, search_request, ApiResult,
    IndexParams,
};
use crate::access::Requester;
use crate::models::{Collection, CollectionHistory, CollectionInput};
use crate::query::Listing;
use crate::schema::ModelName;
use crate::AppState;

/// GET /api/collections - List visible collections.
pub async fn list_collections(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<Collection>> {
    let (query, paginator) =
        index_request(ModelName::Collection, &params, state.config.max_items_per_page)?;
    let collections = state
        .repo
        .search_collections(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(collections))
}

/// POST /api/collections/search - Search collections.
pub async fn search_collections(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Listing<Collection>> {
    let (query, paginator) =
        search_request(ModelName::Collection, &body, state.config.max_items_per_page)?;
    let collections = state
        .repo
        .search_collections(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(collections))
}

/// GET /api/collections/new_search - Attributes and operators a collection search accepts.
pub async fn new_collection_search() -> Json<Value> {
    Json(new_search_response(ModelName::Collection))
}

/// POST /api/collections - Create a collection.
pub async fn create_collection(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Collection> {
    require_writer(&requester)?;
    let input: CollectionInput = decode(&body)?;
    let collection = state.repo.create_collection(&input, &requester).await?;
    Ok(Json(collection))
}

/// GET /api/collections/:id - Get a collection.
pub async fn get_collection(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<Collection> {
    let collection = state.repo.get_collection(id, &requester).await?;
    Ok(Json(collection))
}

/// PUT /api/collections/:id - Update a collection.
pub async fn update_collection(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Collection> {
    require_writer(&requester)?;
    let input: CollectionInput = decode(&body)?;
    let collection = state.repo.update_collection(id, &input, &requester).await?;
    Ok(Json(collection))
}

/// DELETE /api/collections/:id - Delete a collection; returns the deleted collection.
pub async fn delete_collection(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<Collection> {
    require_writer(&requester)?;
    let collection = state.repo.delete_collection(id, &requester).await?;
    Ok(Json(collection))
}

/// GET /api/collections/:id/history - A collection and its previous versions.
///
/// Accepts a numeric id or a UUID.
pub async fn collection_history(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(key): Path<String>,
) -> ApiResult<CollectionHistory> {
    let history = state.repo.collection_history(&key, &requester).await?;
    Ok(Json(history))
}
