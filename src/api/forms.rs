//! Form API endpoints.

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
use crate::models::{Form, FormHistory, FormInput};
use crate::query::Listing;
use crate::schema::ModelName;
use crate::AppState;

/// GET /api/forms - List visible forms.
pub async fn list_forms(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Query(params): Query<IndexParams>,
) -> ApiResult<Listing<Form>> {
    let (query, paginator) =
        index_request(ModelName::Form, &params, state.config.max_items_per_page)?;
    let forms = state
        .repo
        .search_forms(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(forms))
}

/// POST /api/forms/search - Search forms.
pub async fn search_forms(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Listing<Form>> {
    let (query, paginator) =
        search_request(ModelName::Form, &body, state.config.max_items_per_page)?;
    let forms = state
        .repo
        .search_forms(&query, &requester, paginator.as_ref())
        .await?;
    Ok(Json(forms))
}

/// GET /api/forms/new_search - Attributes and operators a form search accepts.
pub async fn new_form_search() -> Json<Value> {
    Json(new_search_response(ModelName::Form))
}

/// POST /api/forms - Create a form.
pub async fn create_form(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Form> {
    require_writer(&requester)?;
    let input: FormInput = decode(&body)?;
    let form = state.repo.create_form(&input, &requester).await?;
    Ok(Json(form))
}

/// GET /api/forms/:id - Get a form.
pub async fn get_form(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<Form> {
    let form = state.repo.get_form(id, &requester).await?;
    Ok(Json(form))
}

/// PUT /api/forms/:id - Update a form.
pub async fn update_form(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Form> {
    require_writer(&requester)?;
    let input: FormInput = decode(&body)?;
    let form = state.repo.update_form(id, &input, &requester).await?;
    Ok(Json(form))
}

/// DELETE /api/forms/:id - Delete a form; returns the deleted form.
pub async fn delete_form(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<Form> {
    require_writer(&requester)?;
    let form = state.repo.delete_form(id, &requester).await?;
    Ok(Json(form))
}

/// GET /api/forms/:id/history - A form and its previous versions.
///
/// Accepts a numeric id or a UUID.
pub async fn form_history(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(key): Path<String>,
) -> ApiResult<FormHistory> {
    let history = state.repo.form_history(&key, &requester).await?;
    Ok(Json(history))
}
