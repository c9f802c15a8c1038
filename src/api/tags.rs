//! Tag API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension, Json,
};

use super::{decode, require_writer, ApiResult};
use crate::access::Requester;
use crate::models::{Tag, TagInput};
use crate::AppState;

/// GET /api/tags - List all tags.
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Vec<Tag>> {
    Ok(Json(state.repo.list_tags().await?))
}

/// POST /api/tags - Create a new tag.
pub async fn create_tag(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Tag> {
    require_writer(&requester)?;
    let input: TagInput = decode(&body)?;
    Ok(Json(state.repo.create_tag(&input).await?))
}

/// PUT /api/tags/:id - Update a tag.
pub async fn update_tag(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Tag> {
    require_writer(&requester)?;
    let input: TagInput = decode(&body)?;
    Ok(Json(state.repo.update_tag(id, &input).await?))
}

/// DELETE /api/tags/:id - Delete a tag; returns the deleted tag.
pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> ApiResult<Tag> {
    require_writer(&requester)?;
    Ok(Json(state.repo.delete_tag(id).await?))
}
