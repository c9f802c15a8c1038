//! Loading records and their mini-dicts from rows.
//!
//! Every loader takes a bare connection so it can run inside a mutation's
//! transaction as well as on a pooled connection.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::errors::AppError;
use crate::models::{
    Collection, CollectionBackup, CollectionSnapshot, File, FileMini, Form, FormBackup, FormMini,
    FormSearch, FormSnapshot, Role, SourceMini, SpeakerMini, TagMini, TranslationMini, User, UserMini,
};

pub(crate) async fn load_user(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query(
        "SELECT id, first_name, last_name, email, affiliation, role, datetime_modified FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(user_from_row))
}

pub(crate) fn user_from_row(row: &SqliteRow) -> User {
    let role: String = row.get("role");
    User {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        affiliation: row.get("affiliation"),
        role: Role::parse(&role).unwrap_or(Role::Viewer),
        datetime_modified: row.get("datetime_modified"),
    }
}

pub(crate) async fn user_mini(
    conn: &mut SqliteConnection,
    id: Option<i64>,
) -> Result<Option<UserMini>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(load_user(conn, id).await?.map(|user| user.mini()))
}

pub(crate) async fn speaker_mini(
    conn: &mut SqliteConnection,
    id: Option<i64>,
) -> Result<Option<SpeakerMini>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    let row = sqlx::query("SELECT id, first_name, last_name, dialect FROM speakers WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| SpeakerMini {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        dialect: row.get("dialect"),
    }))
}

pub(crate) async fn source_mini(
    conn: &mut SqliteConnection,
    id: Option<i64>,
) -> Result<Option<SourceMini>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    let row = sqlx::query(
        "SELECT id, source_type, source_key, author, title, year FROM sources WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| SourceMini {
        id: row.get("id"),
        source_type: row.get("source_type"),
        key: row.get("source_key"),
        author: row.get("author"),
        title: row.get("title"),
        year: row.get("year"),
    }))
}

pub(crate) async fn tag_mini(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<TagMini>, AppError> {
    let row = sqlx::query("SELECT id, name FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| TagMini {
        id: row.get("id"),
        name: row.get("name"),
    }))
}

pub(crate) async fn restricted_tag(conn: &mut SqliteConnection) -> Result<TagMini, AppError> {
    let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
        .bind(crate::models::RESTRICTED_TAG)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::Internal("The restricted tag is missing".to_string()))?;

    Ok(TagMini {
        id: row.get("id"),
        name: row.get("name"),
    })
}

pub(crate) async fn file_mini(
    conn: &mut SqliteConnection,
    id: Option<i64>,
) -> Result<Option<FileMini>, AppError> {
    let Some(id) = id else {
        return Ok(None);
    };
    let row = sqlx::query("SELECT id, name, filename, mime_type, size, url FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(file_mini_from_row))
}

fn file_mini_from_row(row: &SqliteRow) -> FileMini {
    FileMini {
        id: row.get("id"),
        name: row.get("name"),
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        size: row.get("size"),
        url: row.get("url"),
    }
}

pub(crate) async fn form_mini(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<FormMini>, AppError> {
    let row = sqlx::query(
        "SELECT id, transcription, morpheme_break, morpheme_gloss FROM forms WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(form_mini_from_row))
}

fn form_mini_from_row(row: &SqliteRow) -> FormMini {
    FormMini {
        id: row.get("id"),
        transcription: row.get("transcription"),
        morpheme_break: row.get("morpheme_break"),
        morpheme_gloss: row.get("morpheme_gloss"),
    }
}

/// Tags linked to `owner_id` through `link_table`, in id order.
pub(crate) async fn linked_tags(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    owner_id: i64,
) -> Result<Vec<TagMini>, AppError> {
    let sql = format!(
        "SELECT t.id, t.name FROM tags t JOIN {link} l ON l.tag_id = t.id WHERE l.{owner} = ? ORDER BY t.id",
        link = link_table,
        owner = owner_column,
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| TagMini {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

/// Files linked to `owner_id` through `link_table`, in id order.
pub(crate) async fn linked_files(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    owner_id: i64,
) -> Result<Vec<FileMini>, AppError> {
    let sql = format!(
        "SELECT f.id, f.name, f.filename, f.mime_type, f.size, f.url FROM files f JOIN {link} l ON l.file_id = f.id WHERE l.{owner} = ? ORDER BY f.id",
        link = link_table,
        owner = owner_column,
    );
    let rows = sqlx::query(&sql)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.iter().map(file_mini_from_row).collect())
}

pub(crate) async fn load_form(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Form>, AppError> {
    let row = sqlx::query("SELECT * FROM forms WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(form_from_row(conn, &row).await?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_form_by_uuid(
    conn: &mut SqliteConnection,
    uuid: &str,
) -> Result<Option<Form>, AppError> {
    let row = sqlx::query("SELECT * FROM forms WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(form_from_row(conn, &row).await?)),
        None => Ok(None),
    }
}

async fn form_from_row(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<Form, AppError> {
    let id: i64 = row.get("id");

    let translations = sqlx::query(
        "SELECT id, transcription, grammaticality FROM translations WHERE form_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| TranslationMini {
        id: row.get("id"),
        transcription: row.get("transcription"),
        grammaticality: row.get("grammaticality"),
    })
    .collect();

    let snapshot = FormSnapshot {
        transcription: row.get("transcription"),
        phonetic_transcription: row.get("phonetic_transcription"),
        narrow_phonetic_transcription: row.get("narrow_phonetic_transcription"),
        morpheme_break: row.get("morpheme_break"),
        morpheme_gloss: row.get("morpheme_gloss"),
        comments: row.get("comments"),
        speaker_comments: row.get("speaker_comments"),
        grammaticality: row.get("grammaticality"),
        date_elicited: row.get("date_elicited"),
        datetime_entered: row.get("datetime_entered"),
        datetime_modified: row.get("datetime_modified"),
        enterer: user_mini(conn, row.get("enterer_id")).await?,
        elicitor: user_mini(conn, row.get("elicitor_id")).await?,
        verifier: user_mini(conn, row.get("verifier_id")).await?,
        speaker: speaker_mini(conn, row.get("speaker_id")).await?,
        source: source_mini(conn, row.get("source_id")).await?,
        translations,
        tags: linked_tags(conn, "form_tags", "form_id", id).await?,
        files: linked_files(conn, "form_files", "form_id", id).await?,
    };

    Ok(Form {
        id,
        uuid: row.get("uuid"),
        snapshot,
    })
}

pub(crate) async fn load_collection(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Collection>, AppError> {
    let row = sqlx::query("SELECT * FROM collections WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(collection_from_row(conn, &row).await?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_collection_by_uuid(
    conn: &mut SqliteConnection,
    uuid: &str,
) -> Result<Option<Collection>, AppError> {
    let row = sqlx::query("SELECT * FROM collections WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(collection_from_row(conn, &row).await?)),
        None => Ok(None),
    }
}

async fn collection_from_row(
    conn: &mut SqliteConnection,
    row: &SqliteRow,
) -> Result<Collection, AppError> {
    let id: i64 = row.get("id");

    let forms = sqlx::query(
        "SELECT f.id, f.transcription, f.morpheme_break, f.morpheme_gloss FROM forms f JOIN collection_forms l ON l.form_id = f.id WHERE l.collection_id = ? ORDER BY f.id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(form_mini_from_row)
    .collect();

    let snapshot = CollectionSnapshot {
        title: row.get("title"),
        collection_type: row.get("collection_type"),
        url: row.get("url"),
        description: row.get("description"),
        markup_language: row.get("markup_language"),
        contents: row.get("contents"),
        contents_unpacked: row.get("contents_unpacked"),
        date_elicited: row.get("date_elicited"),
        datetime_entered: row.get("datetime_entered"),
        datetime_modified: row.get("datetime_modified"),
        enterer: user_mini(conn, row.get("enterer_id")).await?,
        elicitor: user_mini(conn, row.get("elicitor_id")).await?,
        speaker: speaker_mini(conn, row.get("speaker_id")).await?,
        source: source_mini(conn, row.get("source_id")).await?,
        tags: linked_tags(conn, "collection_tags", "collection_id", id).await?,
        files: linked_files(conn, "collection_files", "collection_id", id).await?,
        forms,
    };

    Ok(Collection {
        id,
        uuid: row.get("uuid"),
        snapshot,
    })
}

pub(crate) async fn load_file(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<File>, AppError> {
    let Some(row) = sqlx::query("SELECT * FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    Ok(Some(File {
        id,
        filename: row.get("filename"),
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        size: row.get("size"),
        description: row.get("description"),
        utterance_type: row.get("utterance_type"),
        url: row.get("url"),
        date_elicited: row.get("date_elicited"),
        datetime_entered: row.get("datetime_entered"),
        datetime_modified: row.get("datetime_modified"),
        enterer: user_mini(conn, row.get("enterer_id")).await?,
        elicitor: user_mini(conn, row.get("elicitor_id")).await?,
        speaker: speaker_mini(conn, row.get("speaker_id")).await?,
        parent_file: file_mini(conn, row.get("parent_file_id")).await?,
        tags: linked_tags(conn, "file_tags", "file_id", id).await?,
    }))
}

pub(crate) async fn load_form_backup(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<FormBackup>, AppError> {
    let row = sqlx::query(
        "SELECT id, form_id, uuid, backuper, snapshot FROM form_backups WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(form_backup_from_row).transpose()
}

pub(crate) fn form_backup_from_row(row: &SqliteRow) -> Result<FormBackup, AppError> {
    Ok(FormBackup {
        id: row.get("id"),
        form_id: row.get("form_id"),
        uuid: row.get("uuid"),
        backuper: decode_optional(row.get("backuper"))?,
        snapshot: serde_json::from_str(row.get::<&str, _>("snapshot"))?,
    })
}

pub(crate) async fn load_collection_backup(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<CollectionBackup>, AppError> {
    let row = sqlx::query(
        "SELECT id, collection_id, uuid, backuper, snapshot FROM collection_backups WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(collection_backup_from_row).transpose()
}

pub(crate) fn collection_backup_from_row(row: &SqliteRow) -> Result<CollectionBackup, AppError> {
    Ok(CollectionBackup {
        id: row.get("id"),
        collection_id: row.get("collection_id"),
        uuid: row.get("uuid"),
        backuper: decode_optional(row.get("backuper"))?,
        snapshot: serde_json::from_str(row.get::<&str, _>("snapshot"))?,
    })
}

pub(crate) async fn load_form_search(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<FormSearch>, AppError> {
    let row = sqlx::query(
        "SELECT id, name, search, description, enterer_id, datetime_modified FROM form_searches WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(FormSearch {
        id: row.get("id"),
        name: row.get("name"),
        search: serde_json::from_str(row.get::<&str, _>("search"))?,
        description: row.get("description"),
        enterer: user_mini(conn, row.get("enterer_id")).await?,
        datetime_modified: row.get("datetime_modified"),
    }))
}

fn decode_optional(text: Option<String>) -> Result<Option<UserMini>, AppError> {
    match text {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(None),
    }
}

/// Ids among `ids` that have a row in `table`, preserving order.
pub(crate) async fn existing_ids(
    conn: &mut SqliteConnection,
    table: &str,
    ids: &[i64],
) -> Result<Vec<i64>, AppError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let mut found = Vec::with_capacity(ids.len());
    for &id in ids {
        let exists = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .is_some();
        if exists {
            found.push(id);
        }
    }
    Ok(found)
}

/// Replace the rows of a link table owned by `owner_id`.
pub(crate) async fn replace_links(
    conn: &mut SqliteConnection,
    link_table: &str,
    owner_column: &str,
    other_column: &str,
    owner_id: i64,
    other_ids: &[i64],
) -> Result<(), AppError> {
    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", link_table, owner_column))
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    let insert = format!(
        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
        link_table, owner_column, other_column
    );
    for other in other_ids {
        sqlx::query(&insert)
            .bind(owner_id)
            .bind(other)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
