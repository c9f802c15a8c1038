//! Validation of submitted relation ids and scalar fields.
//!
//! Each helper records a per-field message instead of failing, so one request
//! reports every problem at once.

use std::collections::BTreeMap;

use sqlx::SqliteConnection;

use super::records::{file_mini, source_mini, speaker_mini, tag_mini, user_mini};
use crate::errors::AppError;
use crate::models::{time, FileMini, SourceMini, SpeakerMini, TagMini, UserMini};

pub(super) type FieldErrors = BTreeMap<String, String>;

pub(super) fn required(errors: &mut FieldErrors, key: &str, value: &str) {
    if value.trim().is_empty() {
        errors.insert(key.to_string(), "Please enter a value".to_string());
    }
}

/// Normalize an optional `YYYY-MM-DD` date; empty counts as absent.
pub(super) fn date(errors: &mut FieldErrors, key: &str, value: Option<&str>) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match time::parse_date(value) {
        Some(parsed) => Some(time::format_date(parsed)),
        None => {
            errors.insert(
                key.to_string(),
                "Please enter a valid date (YYYY-MM-DD)".to_string(),
            );
            None
        }
    }
}

pub(super) async fn user(
    conn: &mut SqliteConnection,
    errors: &mut FieldErrors,
    key: &str,
    id: Option<i64>,
) -> Result<Option<UserMini>, AppError> {
    let found = user_mini(conn, id).await?;
    if let (Some(id), None) = (id, &found) {
        errors.insert(key.to_string(), format!("There is no user with id {}", id));
    }
    Ok(found)
}

pub(super) async fn speaker(
    conn: &mut SqliteConnection,
    errors: &mut FieldErrors,
    id: Option<i64>,
) -> Result<Option<SpeakerMini>, AppError> {
    let found = speaker_mini(conn, id).await?;
    if let (Some(id), None) = (id, &found) {
        errors.insert(
            "speaker".to_string(),
            format!("There is no speaker with id {}", id),
        );
    }
    Ok(found)
}

pub(super) async fn source(
    conn: &mut SqliteConnection,
    errors: &mut FieldErrors,
    id: Option<i64>,
) -> Result<Option<SourceMini>, AppError> {
    let found = source_mini(conn, id).await?;
    if let (Some(id), None) = (id, &found) {
        errors.insert(
            "source".to_string(),
            format!("There is no source with id {}", id),
        );
    }
    Ok(found)
}

pub(super) async fn parent_file(
    conn: &mut SqliteConnection,
    errors: &mut FieldErrors,
    id: Option<i64>,
) -> Result<Option<FileMini>, AppError> {
    let found = file_mini(conn, id).await?;
    if let (Some(id), None) = (id, &found) {
        errors.insert(
            "parent_file".to_string(),
            format!("There is no file with id {}", id),
        );
    }
    Ok(found)
}

/// Tags by id, deduplicated and in id order.
pub(super) async fn tags(
    conn: &mut SqliteConnection,
    errors: &mut FieldErrors,
    ids: &[i64],
) -> Result<Vec<TagMini>, AppError> {
    let mut found = Vec::new();
    for &id in sorted(ids).iter() {
        match tag_mini(conn, id).await? {
            Some(tag) => found.push(tag),
            None => {
                errors.insert("tags".to_string(), format!("There is no tag with id {}", id));
            }
        }
    }
    Ok(found)
}

/// Files by id, deduplicated and in id order.
pub(super) async fn files(
    conn: &mut SqliteConnection,
    errors: &mut FieldErrors,
    ids: &[i64],
) -> Result<Vec<FileMini>, AppError> {
    let mut found = Vec::new();
    for &id in sorted(ids).iter() {
        match file_mini(conn, Some(id)).await? {
            Some(file) => found.push(file),
            None => {
                errors.insert("files".to_string(), format!("There is no file with id {}", id));
            }
        }
    }
    Ok(found)
}

fn sorted(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Add `tag` to `tags`, keeping id order.
pub(super) fn add_tag(tags: &mut Vec<TagMini>, tag: TagMini) {
    if !tags.iter().any(|t| t.id == tag.id) {
        tags.push(tag);
        tags.sort_by_key(|t| t.id);
    }
}
