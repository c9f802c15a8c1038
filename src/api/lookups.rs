//! Speakers, sources, users and application settings.

use axum::{body::Bytes, extract::State, Extension, Json};

use super::{decode, require_administrator, require_writer, ApiResult};
use crate::access::Requester;
use crate::models::{
    ApplicationSettings, CreatedUser, SettingsInput, Source, SourceInput, Speaker, SpeakerInput,
    User, UserInput,
};
use crate::AppState;

/// GET /api/speakers
pub async fn list_speakers(State(state): State<AppState>) -> ApiResult<Vec<Speaker>> {
    Ok(Json(state.repo.list_speakers().await?))
}

/// POST /api/speakers
pub async fn create_speaker(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Speaker> {
    require_writer(&requester)?;
    let input: SpeakerInput = decode(&body)?;
    Ok(Json(state.repo.create_speaker(&input).await?))
}

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> ApiResult<Vec<Source>> {
    Ok(Json(state.repo.list_sources().await?))
}

/// POST /api/sources
pub async fn create_source(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<Source> {
    require_writer(&requester)?;
    let input: SourceInput = decode(&body)?;
    Ok(Json(state.repo.create_source(&input).await?))
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(Json(state.repo.list_users().await?))
}

/// POST /api/users - Administrators only. The response carries the new
/// user's API key; it is not retrievable later.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<CreatedUser> {
    require_administrator(&requester)?;
    let input: UserInput = decode(&body)?;
    let created = state.repo.create_user(&input).await?;
    tracing::info!("User {} created by user {}", created.user.id, requester.id());
    Ok(Json(created))
}

/// GET /api/applicationsettings
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<ApplicationSettings> {
    Ok(Json(state.repo.get_settings().await?))
}

/// PUT /api/applicationsettings - Administrators only.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    body: Bytes,
) -> ApiResult<ApplicationSettings> {
    require_administrator(&requester)?;
    let input: SettingsInput = decode(&body)?;
    Ok(Json(state.repo.update_settings(&input).await?))
}
