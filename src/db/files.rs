//! File metadata persistence. Files are not versioned, but their restriction
//! spreads to child files and to the forms and collections that use them.

use sqlx::SqliteConnection;

use super::inputs::{self, FieldErrors};
use super::records::{load_file, replace_links, restricted_tag};
use super::Repository;
use crate::access::{visible, Requester};
use crate::errors::{AppError, NOT_NEW_MESSAGE};
use crate::models::{has_restricted_tag, time, File, FileInput};
use crate::versioning::{
    any_restricted, detach_file, propagate_restriction, restricted_or_closed, Dependent,
};

impl Repository {
    /// Get a file the requester may see.
    pub async fn get_file(&self, id: i64, requester: &Requester) -> Result<File, AppError> {
        let mut conn = self.pool.acquire().await?;
        let file = load_file(&mut conn, id).await?.ok_or_else(|| not_found(id))?;
        if !visible(&file, requester) {
            return Err(AppError::Forbidden);
        }
        Ok(file)
    }

    /// Create a file entered by the requester.
    pub async fn create_file(&self, input: &FileInput, requester: &Requester) -> Result<File, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut file = draft(&mut tx, input, None).await?;
        let now = time::now();
        file.enterer = Some(requester.user.mini());
        file.datetime_entered = now.clone();
        file.datetime_modified = now;

        let result = sqlx::query(
            "INSERT INTO files (datetime_entered, datetime_modified) VALUES (?, ?)",
        )
        .bind(&file.datetime_entered)
        .bind(&file.datetime_modified)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        write_file(&mut tx, id, &file).await?;

        let file = load_file(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("File {} created by user {}", id, requester.id());
        Ok(file)
    }

    /// Update a file's metadata.
    pub async fn update_file(
        &self,
        id: i64,
        input: &FileInput,
        requester: &Requester,
    ) -> Result<File, AppError> {
        let mut tx = self.pool.begin().await?;

        let old = load_file(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        if !visible(&old, requester) {
            return Err(AppError::Forbidden);
        }

        let mut file = draft(&mut tx, input, Some(id)).await?;
        file.enterer = old.enterer.clone();
        file.datetime_entered = old.datetime_entered.clone();
        file.datetime_modified = old.datetime_modified.clone();
        if serde_json::to_value(&file)? == serde_json::to_value(&old)? {
            return Err(AppError::BadRequest(NOT_NEW_MESSAGE.to_string()));
        }

        file.datetime_modified = time::next_modified(&old.datetime_modified);
        write_file(&mut tx, id, &file).await?;

        if file.is_restricted() && !old.is_restricted() {
            propagate_restriction(&mut tx, Dependent::File(id), &requester.user.mini()).await?;
        }

        let file = load_file(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("File {} updated by user {}", id, requester.id());
        Ok(file)
    }

    /// Delete a file. Children lose their parent; forms and collections lose
    /// the link and are backed up.
    pub async fn delete_file(&self, id: i64, requester: &Requester) -> Result<File, AppError> {
        let mut tx = self.pool.begin().await?;

        let old = load_file(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        let enterer = old.enterer.as_ref().map(|u| u.id);
        if !visible(&old, requester) || !requester.can_delete(enterer) {
            return Err(AppError::Forbidden);
        }

        sqlx::query("UPDATE files SET parent_file_id = NULL WHERE parent_file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        detach_file(&mut tx, id, &requester.user.mini()).await?;
        sqlx::query("DELETE FROM file_tags WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("File {} deleted by user {}", id, requester.id());
        Ok(old)
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("There is no file with id {}", id))
}

/// Validate a submission into a file without enterer or timestamps.
async fn draft(
    conn: &mut SqliteConnection,
    input: &FileInput,
    own_id: Option<i64>,
) -> Result<File, AppError> {
    let mut errors = FieldErrors::new();

    inputs::required(&mut errors, "filename", &input.filename);
    let date_elicited = inputs::date(&mut errors, "date_elicited", input.date_elicited.as_deref());
    let elicitor = inputs::user(conn, &mut errors, "elicitor", input.elicitor).await?;
    let speaker = inputs::speaker(conn, &mut errors, input.speaker).await?;
    let mut tags = inputs::tags(conn, &mut errors, &input.tags).await?;
    let parent_file = inputs::parent_file(conn, &mut errors, input.parent_file).await?;

    if let (Some(own), Some(parent)) = (own_id, input.parent_file) {
        if is_ancestor(conn, own, parent).await? {
            errors.insert(
                "parent_file".to_string(),
                "A file cannot be its own ancestor".to_string(),
            );
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if !has_restricted_tag(&tags) {
        let parent_ids: Vec<i64> = parent_file.iter().map(|p| p.id).collect();
        let inherited = restricted_or_closed(
            any_restricted(conn, "file_tags", "file_id", &parent_ids).await,
            "the parent of a file",
        );
        if inherited {
            inputs::add_tag(&mut tags, restricted_tag(conn).await?);
        }
    }

    let name = if input.name.trim().is_empty() {
        input.filename.clone()
    } else {
        input.name.clone()
    };

    Ok(File {
        id: own_id.unwrap_or_default(),
        filename: input.filename.clone(),
        name,
        mime_type: input.mime_type.clone(),
        size: input.size,
        description: input.description.clone(),
        utterance_type: input.utterance_type.clone(),
        url: input.url.clone(),
        date_elicited,
        datetime_entered: String::new(),
        datetime_modified: String::new(),
        enterer: None,
        elicitor,
        speaker,
        parent_file,
        tags,
    })
}

/// Is `ancestor` equal to `start` or reachable by following parent links up
/// from `start`?
async fn is_ancestor(
    conn: &mut SqliteConnection,
    ancestor: i64,
    start: i64,
) -> Result<bool, AppError> {
    let mut current = Some(start);
    let mut seen = std::collections::HashSet::new();
    while let Some(id) = current {
        if id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id) {
            break;
        }
        current = sqlx::query_scalar::<_, Option<i64>>("SELECT parent_file_id FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();
    }
    Ok(false)
}

async fn write_file(conn: &mut SqliteConnection, id: i64, file: &File) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE files SET
            filename = ?, name = ?, mime_type = ?, size = ?, description = ?,
            utterance_type = ?, url = ?, date_elicited = ?, datetime_modified = ?,
            enterer_id = ?, elicitor_id = ?, speaker_id = ?, parent_file_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&file.filename)
    .bind(&file.name)
    .bind(&file.mime_type)
    .bind(file.size)
    .bind(&file.description)
    .bind(&file.utterance_type)
    .bind(&file.url)
    .bind(&file.date_elicited)
    .bind(&file.datetime_modified)
    .bind(file.enterer.as_ref().map(|u| u.id))
    .bind(file.elicitor.as_ref().map(|u| u.id))
    .bind(file.speaker.as_ref().map(|s| s.id))
    .bind(file.parent_file.as_ref().map(|p| p.id))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    let tag_ids: Vec<i64> = file.tags.iter().map(|t| t.id).collect();
    replace_links(conn, "file_tags", "file_id", "tag_id", id, &tag_ids).await?;
    Ok(())
}
