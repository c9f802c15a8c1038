//! Collection persistence.
//!
//! Collections embed forms and other collections through textual references
//! in `contents`. On every write the references are validated, expanded into
//! `contents_unpacked` and the referenced forms are linked.

use sqlx::{Row, SqliteConnection};

use super::inputs::{self, FieldErrors};
use super::records::{
    collection_backup_from_row, existing_ids, form_mini, load_collection, load_collection_by_uuid,
    replace_links, restricted_tag,
};
use super::Repository;
use crate::access::{visible, Requester};
use crate::errors::{AppError, NOT_NEW_MESSAGE};
use crate::models::{
    time, Collection, CollectionBackup, CollectionHistory, CollectionInput, CollectionSnapshot,
};
use crate::versioning::references::{collection_ids, form_ids, unpack, ReferenceError};
use crate::versioning::{
    any_restricted, backup_collection, contents_lookup, detach_collection, propagate_restriction,
    reference_graph, refresh_referencing, restricted_or_closed, Dependent,
};

impl Repository {
    /// Get a collection the requester may see.
    pub async fn get_collection(
        &self,
        id: i64,
        requester: &Requester,
    ) -> Result<Collection, AppError> {
        let mut conn = self.pool.acquire().await?;
        let collection = load_collection(&mut conn, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if !visible(&collection, requester) {
            return Err(AppError::Forbidden);
        }
        Ok(collection)
    }

    /// Create a collection entered by the requester.
    pub async fn create_collection(
        &self,
        input: &CollectionInput,
        requester: &Requester,
    ) -> Result<Collection, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut snapshot = draft(&mut tx, input, None, requester).await?;
        let now = time::now();
        snapshot.enterer = Some(requester.user.mini());
        snapshot.datetime_entered = now.clone();
        snapshot.datetime_modified = now;

        let result = sqlx::query(
            "INSERT INTO collections (uuid, datetime_entered, datetime_modified) VALUES (?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&snapshot.datetime_entered)
        .bind(&snapshot.datetime_modified)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        write_collection(&mut tx, id, &snapshot).await?;

        let collection = load_collection(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("Collection {} created by user {}", id, requester.id());
        Ok(collection)
    }

    /// Update a collection, backing up its previous state and refreshing
    /// every collection that embeds it.
    pub async fn update_collection(
        &self,
        id: i64,
        input: &CollectionInput,
        requester: &Requester,
    ) -> Result<Collection, AppError> {
        let mut tx = self.pool.begin().await?;

        let old = load_collection(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if !visible(&old, requester) {
            return Err(AppError::Forbidden);
        }

        let mut snapshot = draft(&mut tx, input, Some(id), requester).await?;
        snapshot.enterer = old.snapshot.enterer.clone();
        snapshot.datetime_entered = old.snapshot.datetime_entered.clone();

        if snapshot.content() == old.snapshot.content() {
            return Err(AppError::BadRequest(NOT_NEW_MESSAGE.to_string()));
        }

        let backuper = requester.user.mini();
        backup_collection(&mut tx, &old, &backuper).await?;
        snapshot.datetime_modified = time::next_modified(&old.snapshot.datetime_modified);
        write_collection(&mut tx, id, &snapshot).await?;

        if snapshot.contents_unpacked != old.snapshot.contents_unpacked {
            refresh_referencing(&mut tx, id, &backuper).await?;
        }
        if snapshot.is_restricted() && !old.snapshot.is_restricted() {
            propagate_restriction(&mut tx, Dependent::Collection(id), &backuper).await?;
        }

        let collection = load_collection(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("Collection {} updated by user {}", id, requester.id());
        Ok(collection)
    }

    /// Delete a collection and strip references to it.
    pub async fn delete_collection(
        &self,
        id: i64,
        requester: &Requester,
    ) -> Result<Collection, AppError> {
        let mut tx = self.pool.begin().await?;

        let old = load_collection(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        let enterer = old.snapshot.enterer.as_ref().map(|u| u.id);
        if !visible(&old, requester) || !requester.can_delete(enterer) {
            return Err(AppError::Forbidden);
        }

        let backuper = requester.user.mini();
        backup_collection(&mut tx, &old, &backuper).await?;
        detach_collection(&mut tx, id, &backuper).await?;

        for table in ["collection_tags", "collection_files", "collection_forms"] {
            sqlx::query(&format!("DELETE FROM {} WHERE collection_id = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Collection {} deleted by user {}", id, requester.id());
        Ok(old)
    }

    /// The live collection (if any) and its visible previous versions.
    pub async fn collection_history(
        &self,
        key: &str,
        requester: &Requester,
    ) -> Result<CollectionHistory, AppError> {
        let mut conn = self.pool.acquire().await?;

        let (collection, backups) = match key.parse::<i64>() {
            Ok(id) => match load_collection(&mut conn, id).await? {
                Some(collection) => {
                    let backups = backups_by_uuid(&mut conn, &collection.uuid).await?;
                    (Some(collection), backups)
                }
                None => (None, backups_by_collection_id(&mut conn, id).await?),
            },
            Err(_) => {
                let collection = load_collection_by_uuid(&mut conn, key).await?;
                (collection, backups_by_uuid(&mut conn, key).await?)
            }
        };

        if collection.is_none() && backups.is_empty() {
            return Err(AppError::NotFound(format!(
                "No collections or collection backups match {}",
                key
            )));
        }
        if let Some(collection) = &collection {
            if !visible(collection, requester) {
                return Err(AppError::Forbidden);
            }
        }
        let previous_versions: Vec<CollectionBackup> = backups
            .into_iter()
            .filter(|backup| visible(backup, requester))
            .collect();
        if collection.is_none() && previous_versions.is_empty() {
            return Err(AppError::Forbidden);
        }

        Ok(CollectionHistory {
            collection,
            previous_versions,
        })
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("There is no collection with id {}", id))
}

/// Validate a submission into a snapshot without enterer or timestamps.
///
/// `own_id` is the collection being updated, if any.
async fn draft(
    conn: &mut SqliteConnection,
    input: &CollectionInput,
    own_id: Option<i64>,
    requester: &Requester,
) -> Result<CollectionSnapshot, AppError> {
    let mut errors = FieldErrors::new();

    inputs::required(&mut errors, "title", &input.title);
    let date_elicited = inputs::date(&mut errors, "date_elicited", input.date_elicited.as_deref());
    let elicitor = inputs::user(conn, &mut errors, "elicitor", input.elicitor).await?;
    let speaker = inputs::speaker(conn, &mut errors, input.speaker).await?;
    let source = inputs::source(conn, &mut errors, input.source).await?;
    let mut tags = inputs::tags(conn, &mut errors, &input.tags).await?;
    let files = inputs::files(conn, &mut errors, &input.files).await?;

    let graph = reference_graph(conn, &input.contents).await?;
    let mut reference_error = None;
    for id in collection_ids(&input.contents) {
        match graph.get(&id) {
            None if Some(id) != own_id => {
                reference_error = Some(ReferenceError::Invalid(id));
            }
            Some(node)
                if node.restricted
                    && !requester.sees_everything()
                    && node.enterer_id != Some(requester.id()) =>
            {
                reference_error = Some(ReferenceError::Unauthorized(id));
            }
            _ => {}
        }
        if reference_error.is_some() {
            break;
        }
    }
    let contents_unpacked = match reference_error {
        Some(e) => {
            errors.insert("contents".to_string(), e.to_string());
            String::new()
        }
        None => match unpack(&input.contents, own_id, &contents_lookup(&graph)) {
            Ok(unpacked) => unpacked,
            Err(e) => {
                errors.insert("contents".to_string(), e.to_string());
                String::new()
            }
        },
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let mut form_ids = existing_ids(conn, "forms", &form_ids(&contents_unpacked)).await?;
    form_ids.sort_unstable();
    let mut forms = Vec::with_capacity(form_ids.len());
    for id in &form_ids {
        if let Some(form) = form_mini(conn, *id).await? {
            forms.push(form);
        }
    }

    let mut snapshot = CollectionSnapshot {
        title: input.title.clone(),
        collection_type: input.collection_type.clone(),
        url: input.url.clone(),
        description: input.description.clone(),
        markup_language: input.markup_language.clone(),
        contents: input.contents.clone(),
        contents_unpacked,
        date_elicited,
        datetime_entered: String::new(),
        datetime_modified: String::new(),
        enterer: None,
        elicitor,
        speaker,
        source,
        tags: Vec::new(),
        files,
        forms,
    };

    if !crate::models::has_restricted_tag(&tags) {
        let file_ids: Vec<i64> = snapshot.files.iter().map(|f| f.id).collect();
        let inherited = graph.values().any(|node| node.restricted)
            || restricted_or_closed(
                any_restricted(conn, "form_tags", "form_id", &form_ids).await,
                "the forms of a collection",
            )
            || restricted_or_closed(
                any_restricted(conn, "file_tags", "file_id", &file_ids).await,
                "the files of a collection",
            );
        if inherited {
            inputs::add_tag(&mut tags, restricted_tag(conn).await?);
        }
    }
    snapshot.tags = tags;
    Ok(snapshot)
}

/// Write every column and relation of `snapshot` to collection `id`.
async fn write_collection(
    conn: &mut SqliteConnection,
    id: i64,
    snapshot: &CollectionSnapshot,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE collections SET
            title = ?, collection_type = ?, url = ?, description = ?, markup_language = ?,
            contents = ?, contents_unpacked = ?, date_elicited = ?, datetime_modified = ?,
            enterer_id = ?, elicitor_id = ?, speaker_id = ?, source_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&snapshot.title)
    .bind(&snapshot.collection_type)
    .bind(&snapshot.url)
    .bind(&snapshot.description)
    .bind(&snapshot.markup_language)
    .bind(&snapshot.contents)
    .bind(&snapshot.contents_unpacked)
    .bind(&snapshot.date_elicited)
    .bind(&snapshot.datetime_modified)
    .bind(snapshot.enterer.as_ref().map(|u| u.id))
    .bind(snapshot.elicitor.as_ref().map(|u| u.id))
    .bind(snapshot.speaker.as_ref().map(|s| s.id))
    .bind(snapshot.source.as_ref().map(|s| s.id))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    let tag_ids: Vec<i64> = snapshot.tags.iter().map(|t| t.id).collect();
    replace_links(conn, "collection_tags", "collection_id", "tag_id", id, &tag_ids).await?;
    let file_ids: Vec<i64> = snapshot.files.iter().map(|f| f.id).collect();
    replace_links(conn, "collection_files", "collection_id", "file_id", id, &file_ids).await?;
    let form_ids: Vec<i64> = snapshot.forms.iter().map(|f| f.id).collect();
    replace_links(conn, "collection_forms", "collection_id", "form_id", id, &form_ids).await?;
    Ok(())
}

async fn backups_by_uuid(
    conn: &mut SqliteConnection,
    uuid: &str,
) -> Result<Vec<CollectionBackup>, AppError> {
    let rows = sqlx::query(
        "SELECT id, collection_id, uuid, backuper, snapshot FROM collection_backups WHERE uuid = ? ORDER BY id DESC",
    )
    .bind(uuid)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(collection_backup_from_row).collect()
}

/// Backups of a deleted collection, limited to its most recent UUID.
async fn backups_by_collection_id(
    conn: &mut SqliteConnection,
    collection_id: i64,
) -> Result<Vec<CollectionBackup>, AppError> {
    let latest = sqlx::query(
        "SELECT uuid FROM collection_backups WHERE collection_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(collection_id)
    .fetch_optional(&mut *conn)
    .await?;

    match latest {
        Some(row) => {
            let uuid: String = row.get("uuid");
            backups_by_uuid(conn, &uuid).await
        }
        None => Ok(Vec::new()),
    }
}
