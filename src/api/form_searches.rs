//! Saved form search endpoints.

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
use crate::errors::AppError;
use crate::models::{Form, FormSearch, FormSearchInput};
use crate::query::{Listing, Paginator};
use crate::schema::ModelName;
use crate::AppState;

/// GET /api/formsearches - List saved form searches.
pub async fn list_form_searches(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<FormSearch>> {
    let (query, paginator) =
        index_request(ModelName::FormSearch, &params, state.config.max_items_per_page)?;
    let searches = state
        .repo
        .search_form_searches(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(searches))
}

/// POST /api/formsearches/search - Search the saved form searches.
pub async fn search_form_searches(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Listing<FormSearch>> {
    let (query, paginator) =
        search_request(ModelName::FormSearch, &body, state.config.max_items_per_page)?;
    let searches = state
        .repo
        .search_form_searches(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(searches))
}

/// GET /api/formsearches/new_search
pub async fn new_saved_search_search() -> Json<Value> {
    Json(new_search_response(ModelName::FormSearch))
}

/// POST /api/formsearches - Save a form search.
pub async fn create_form_search(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<FormSearch> {
    require_writer(&requester)?;
    let input: FormSearchInput = decode(&body)?;
    Ok(Json(state.repo.create_form_search(&input, &requester).await?))
}

/// GET /api/formsearches/:id - Get a saved form search.
pub async fn get_form_search(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<FormSearch> {
    Ok(Json(state.repo.get_form_search(id).await?))
}

/// PUT /api/formsearches/:id - Update a saved form search.
pub async fn update_form_search(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<FormSearch> {
    require_writer(&requester)?;
    let input: FormSearchInput = decode(&body)?;
    Ok(Json(
        state.repo.update_form_search(id, &input, &requester).await?,
    ))
}

/// DELETE /api/formsearches/:id - Delete a saved form search.
pub async fn delete_form_search(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<FormSearch> {
    require_writer(&requester)?;
    Ok(Json(state.repo.delete_form_search(id, &requester).await?))
}

/// GET /api/formsearches/:id/forms - Run a saved search.
pub async fn run_form_search(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<Form>> {
    let paginator = Paginator::from_params(
        params.page.as_deref(),
        params.items_per_page.as_deref(),
        state.config.max_items_per_page,
    )
    .map_err(AppError::Validation)?;
    let forms = state
        .repo
        .run_form_search(id, &requester, paginator.as_ref())
        .await?;
    Ok(Json(forms))
}
