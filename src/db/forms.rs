//! Form persistence: create, update, delete and history.
//!
//! Every mutation runs in one transaction together with the backup of the
//! prior state and any restriction or reference changes it causes.

use sqlx::{Row, SqliteConnection};

use super::inputs::{self, FieldErrors};
use super::records::{form_backup_from_row, load_form, load_form_by_uuid, replace_links, restricted_tag};
use super::Repository;
use crate::access::{visible, Requester};
use crate::errors::{AppError, NOT_NEW_MESSAGE};
use crate::models::{time, Form, FormBackup, FormHistory, FormInput, FormSnapshot, TranslationMini};
use crate::versioning::{
    any_restricted, backup_form, detach_form, propagate_restriction, restricted_or_closed,
    Dependent,
};

impl Repository {
    /// Get a form the requester may see.
    pub async fn get_form(&self, id: i64, requester: &Requester) -> Result<Form, AppError> {
        let mut conn = self.pool.acquire().await?;
        let form = load_form(&mut conn, id).await?.ok_or_else(|| not_found(id))?;
        if !visible(&form, requester) {
            return Err(AppError::Forbidden);
        }
        Ok(form)
    }

    /// Create a form entered by the requester.
    pub async fn create_form(&self, input: &FormInput, requester: &Requester) -> Result<Form, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut snapshot = draft(&mut tx, input).await?;
        let now = time::now();
        snapshot.enterer = Some(requester.user.mini());
        snapshot.datetime_entered = now.clone();
        snapshot.datetime_modified = now;
        inherit_restriction(&mut tx, &mut snapshot).await?;

        let uuid = uuid::Uuid::new_v4().to_string();
        let result = sqlx::query(
            "INSERT INTO forms (uuid, datetime_entered, datetime_modified) VALUES (?, ?, ?)",
        )
        .bind(&uuid)
        .bind(&snapshot.datetime_entered)
        .bind(&snapshot.datetime_modified)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        write_form(&mut tx, id, &snapshot).await?;

        let form = load_form(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("Form {} created by user {}", id, requester.id());
        Ok(form)
    }

    /// Update a form, backing up its previous state.
    pub async fn update_form(
        &self,
        id: i64,
        input: &FormInput,
        requester: &Requester,
    ) -> Result<Form, AppError> {
        let mut tx = self.pool.begin().await?;

        let old = load_form(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        if !visible(&old, requester) {
            return Err(AppError::Forbidden);
        }

        let mut snapshot = draft(&mut tx, input).await?;
        snapshot.enterer = old.snapshot.enterer.clone();
        snapshot.datetime_entered = old.snapshot.datetime_entered.clone();
        inherit_restriction(&mut tx, &mut snapshot).await?;

        if snapshot.content() == old.snapshot.content() {
            return Err(AppError::BadRequest(NOT_NEW_MESSAGE.to_string()));
        }

        let backuper = requester.user.mini();
        backup_form(&mut tx, &old, &backuper).await?;
        snapshot.datetime_modified = time::next_modified(&old.snapshot.datetime_modified);
        write_form(&mut tx, id, &snapshot).await?;

        if snapshot.is_restricted() && !old.snapshot.is_restricted() {
            propagate_restriction(&mut tx, Dependent::Form(id), &backuper).await?;
        }

        let form = load_form(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("Form {} updated by user {}", id, requester.id());
        Ok(form)
    }

    /// Delete a form, leaving a final backup behind.
    pub async fn delete_form(&self, id: i64, requester: &Requester) -> Result<Form, AppError> {
        let mut tx = self.pool.begin().await?;

        let old = load_form(&mut tx, id).await?.ok_or_else(|| not_found(id))?;
        if !visible(&old, requester) || !requester.can_delete(old.snapshot.enterer.as_ref().map(|u| u.id)) {
            return Err(AppError::Forbidden);
        }

        let backuper = requester.user.mini();
        backup_form(&mut tx, &old, &backuper).await?;
        detach_form(&mut tx, id, &backuper).await?;

        for table in ["translations", "form_tags", "form_files"] {
            sqlx::query(&format!("DELETE FROM {} WHERE form_id = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM forms WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Form {} deleted by user {}", id, requester.id());
        Ok(old)
    }

    /// The live form (if any) and its visible previous versions.
    ///
    /// `key` is either a numeric id or a UUID.
    pub async fn form_history(&self, key: &str, requester: &Requester) -> Result<FormHistory, AppError> {
        let mut conn = self.pool.acquire().await?;

        let (form, backups) = match key.parse::<i64>() {
            Ok(id) => match load_form(&mut conn, id).await? {
                Some(form) => {
                    let backups = form_backups_by_uuid(&mut conn, &form.uuid).await?;
                    (Some(form), backups)
                }
                None => (None, form_backups_by_form_id(&mut conn, id).await?),
            },
            Err(_) => {
                let form = load_form_by_uuid(&mut conn, key).await?;
                (form, form_backups_by_uuid(&mut conn, key).await?)
            }
        };

        if form.is_none() && backups.is_empty() {
            return Err(AppError::NotFound(format!(
                "No forms or form backups match {}",
                key
            )));
        }
        if let Some(form) = &form {
            if !visible(form, requester) {
                return Err(AppError::Forbidden);
            }
        }
        let previous_versions: Vec<FormBackup> = backups
            .into_iter()
            .filter(|backup| visible(backup, requester))
            .collect();
        if form.is_none() && previous_versions.is_empty() {
            return Err(AppError::Forbidden);
        }

        Ok(FormHistory {
            form,
            previous_versions,
        })
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("There is no form with id {}", id))
}

/// Validate a submission into a snapshot without enterer or timestamps.
async fn draft(conn: &mut SqliteConnection, input: &FormInput) -> Result<FormSnapshot, AppError> {
    let mut errors = FieldErrors::new();

    inputs::required(&mut errors, "transcription", &input.transcription);
    let date_elicited = inputs::date(&mut errors, "date_elicited", input.date_elicited.as_deref());
    let elicitor = inputs::user(conn, &mut errors, "elicitor", input.elicitor).await?;
    let verifier = inputs::user(conn, &mut errors, "verifier", input.verifier).await?;
    let speaker = inputs::speaker(conn, &mut errors, input.speaker).await?;
    let source = inputs::source(conn, &mut errors, input.source).await?;
    let tags = inputs::tags(conn, &mut errors, &input.tags).await?;
    let files = inputs::files(conn, &mut errors, &input.files).await?;

    let mut translations = Vec::with_capacity(input.translations.len());
    for translation in &input.translations {
        if translation.transcription.trim().is_empty() {
            errors.insert(
                "translations".to_string(),
                "Please enter a transcription for every translation".to_string(),
            );
            continue;
        }
        translations.push(TranslationMini {
            id: 0,
            transcription: translation.transcription.clone(),
            grammaticality: translation.grammaticality.clone(),
        });
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok(FormSnapshot {
        transcription: input.transcription.clone(),
        phonetic_transcription: input.phonetic_transcription.clone(),
        narrow_phonetic_transcription: input.narrow_phonetic_transcription.clone(),
        morpheme_break: input.morpheme_break.clone(),
        morpheme_gloss: input.morpheme_gloss.clone(),
        comments: input.comments.clone(),
        speaker_comments: input.speaker_comments.clone(),
        grammaticality: input.grammaticality.clone(),
        date_elicited,
        datetime_entered: String::new(),
        datetime_modified: String::new(),
        enterer: None,
        elicitor,
        verifier,
        speaker,
        source,
        translations,
        tags,
        files,
    })
}

/// A form with a restricted file is restricted itself.
async fn inherit_restriction(
    conn: &mut SqliteConnection,
    snapshot: &mut FormSnapshot,
) -> Result<(), AppError> {
    if snapshot.is_restricted() {
        return Ok(());
    }
    let file_ids: Vec<i64> = snapshot.files.iter().map(|f| f.id).collect();
    let inherited = restricted_or_closed(
        any_restricted(conn, "file_tags", "file_id", &file_ids).await,
        "the files of a form",
    );
    if inherited {
        inputs::add_tag(&mut snapshot.tags, restricted_tag(conn).await?);
    }
    Ok(())
}

/// Write every column and relation of `snapshot` to form `id`.
async fn write_form(
    conn: &mut SqliteConnection,
    id: i64,
    snapshot: &FormSnapshot,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE forms SET
            transcription = ?, phonetic_transcription = ?, narrow_phonetic_transcription = ?,
            morpheme_break = ?, morpheme_gloss = ?, comments = ?, speaker_comments = ?,
            grammaticality = ?, date_elicited = ?, datetime_modified = ?,
            enterer_id = ?, elicitor_id = ?, verifier_id = ?, speaker_id = ?, source_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&snapshot.transcription)
    .bind(&snapshot.phonetic_transcription)
    .bind(&snapshot.narrow_phonetic_transcription)
    .bind(&snapshot.morpheme_break)
    .bind(&snapshot.morpheme_gloss)
    .bind(&snapshot.comments)
    .bind(&snapshot.speaker_comments)
    .bind(&snapshot.grammaticality)
    .bind(&snapshot.date_elicited)
    .bind(&snapshot.datetime_modified)
    .bind(snapshot.enterer.as_ref().map(|u| u.id))
    .bind(snapshot.elicitor.as_ref().map(|u| u.id))
    .bind(snapshot.verifier.as_ref().map(|u| u.id))
    .bind(snapshot.speaker.as_ref().map(|s| s.id))
    .bind(snapshot.source.as_ref().map(|s| s.id))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM translations WHERE form_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    for translation in &snapshot.translations {
        sqlx::query(
            "INSERT INTO translations (form_id, transcription, grammaticality, datetime_modified) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&translation.transcription)
        .bind(&translation.grammaticality)
        .bind(&snapshot.datetime_modified)
        .execute(&mut *conn)
        .await?;
    }

    let tag_ids: Vec<i64> = snapshot.tags.iter().map(|t| t.id).collect();
    replace_links(conn, "form_tags", "form_id", "tag_id", id, &tag_ids).await?;
    let file_ids: Vec<i64> = snapshot.files.iter().map(|f| f.id).collect();
    replace_links(conn, "form_files", "form_id", "file_id", id, &file_ids).await?;
    Ok(())
}

async fn form_backups_by_uuid(
    conn: &mut SqliteConnection,
    uuid: &str,
) -> Result<Vec<FormBackup>, AppError> {
    let rows = sqlx::query(
        "SELECT id, form_id, uuid, backuper, snapshot FROM form_backups WHERE uuid = ? ORDER BY id DESC",
    )
    .bind(uuid)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(form_backup_from_row).collect()
}

/// Backups of a deleted form, limited to its most recent UUID.
async fn form_backups_by_form_id(
    conn: &mut SqliteConnection,
    form_id: i64,
) -> Result<Vec<FormBackup>, AppError> {
    let latest = sqlx::query(
        "SELECT uuid FROM form_backups WHERE form_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(form_id)
    .fetch_optional(&mut *conn)
    .await?;

    match latest {
        Some(row) => {
            let uuid: String = row.get("uuid");
            form_backups_by_uuid(conn, &uuid).await
        }
        None => Ok(Vec::new()),
    }
}
