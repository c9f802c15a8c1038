//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. Connections are
//! opened with the `REGEXP` function installed and with case-sensitive `LIKE`,
//! which the search language relies on.

mod backups;
mod collections;
mod files;
mod form_searches;
mod forms;
mod inputs;
mod records;
mod repository;
mod search;

pub use repository::*;
pub(crate) use records::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30))
        .pragma("case_sensitive_like", "ON")
        .with_regexp();

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            affiliation TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL,
            api_secret_hash TEXT NOT NULL,
            datetime_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS speakers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            dialect TEXT NOT NULL DEFAULT '',
            datetime_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type TEXT NOT NULL DEFAULT '',
            source_key TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            year INTEGER,
            journal TEXT NOT NULL DEFAULT '',
            datetime_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            datetime_modified TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            mime_type TEXT NOT NULL DEFAULT '',
            size INTEGER,
            description TEXT NOT NULL DEFAULT '',
            utterance_type TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            date_elicited TEXT,
            datetime_entered TEXT NOT NULL,
            datetime_modified TEXT NOT NULL,
            enterer_id INTEGER,
            elicitor_id INTEGER,
            speaker_id INTEGER,
            parent_file_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS forms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            transcription TEXT NOT NULL DEFAULT '',
            phonetic_transcription TEXT NOT NULL DEFAULT '',
            narrow_phonetic_transcription TEXT NOT NULL DEFAULT '',
            morpheme_break TEXT NOT NULL DEFAULT '',
            morpheme_gloss TEXT NOT NULL DEFAULT '',
            comments TEXT NOT NULL DEFAULT '',
            speaker_comments TEXT NOT NULL DEFAULT '',
            grammaticality TEXT NOT NULL DEFAULT '',
            date_elicited TEXT,
            datetime_entered TEXT NOT NULL,
            datetime_modified TEXT NOT NULL,
            enterer_id INTEGER,
            elicitor_id INTEGER,
            verifier_id INTEGER,
            speaker_id INTEGER,
            source_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS translations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_id INTEGER NOT NULL,
            transcription TEXT NOT NULL DEFAULT '',
            grammaticality TEXT NOT NULL DEFAULT '',
            datetime_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            collection_type TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            markup_language TEXT NOT NULL DEFAULT '',
            contents TEXT NOT NULL DEFAULT '',
            contents_unpacked TEXT NOT NULL DEFAULT '',
            date_elicited TEXT,
            datetime_entered TEXT NOT NULL,
            datetime_modified TEXT NOT NULL,
            enterer_id INTEGER,
            elicitor_id INTEGER,
            speaker_id INTEGER,
            source_id INTEGER
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Link tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_tags (
            file_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (file_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS form_tags (
            form_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (form_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS form_files (
            form_id INTEGER NOT NULL,
            file_id INTEGER NOT NULL,
            PRIMARY KEY (form_id, file_id)
        );

        CREATE TABLE IF NOT EXISTS collection_tags (
            collection_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (collection_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS collection_files (
            collection_id INTEGER NOT NULL,
            file_id INTEGER NOT NULL,
            PRIMARY KEY (collection_id, file_id)
        );

        CREATE TABLE IF NOT EXISTS collection_forms (
            collection_id INTEGER NOT NULL,
            form_id INTEGER NOT NULL,
            PRIMARY KEY (collection_id, form_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Backups keep the serialized snapshot; only identity columns are real.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_backups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            form_id INTEGER NOT NULL,
            uuid TEXT NOT NULL,
            datetime_modified TEXT NOT NULL,
            backuper TEXT,
            snapshot TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collection_backups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection_id INTEGER NOT NULL,
            uuid TEXT NOT NULL,
            datetime_modified TEXT NOT NULL,
            backuper TEXT,
            snapshot TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS form_searches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            search TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            enterer_id INTEGER,
            datetime_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS application_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            object_language_name TEXT NOT NULL DEFAULT '',
            unrestricted_users TEXT NOT NULL DEFAULT '[]',
            datetime_modified TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_forms_uuid ON forms(uuid);
        CREATE INDEX IF NOT EXISTS idx_collections_uuid ON collections(uuid);
        CREATE INDEX IF NOT EXISTS idx_translations_form_id ON translations(form_id);
        CREATE INDEX IF NOT EXISTS idx_files_parent_file_id ON files(parent_file_id);
        CREATE INDEX IF NOT EXISTS idx_form_backups_uuid ON form_backups(uuid);
        CREATE INDEX IF NOT EXISTS idx_form_backups_form_id ON form_backups(form_id);
        CREATE INDEX IF NOT EXISTS idx_collection_backups_uuid ON collection_backups(uuid);
        CREATE INDEX IF NOT EXISTS idx_collection_backups_collection_id ON collection_backups(collection_id);
        "#,
    )
    .execute(pool)
    .await?;

    let now = crate::models::time::now();
    sqlx::query(
        "INSERT OR IGNORE INTO tags (name, description, datetime_modified) VALUES (?, 'Restricts visibility of tagged records.', ?)",
    )
    .bind(crate::models::RESTRICTED_TAG)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO application_settings (id, object_language_name, unrestricted_users, datetime_modified) VALUES (1, '', '[]', ?)",
    )
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent_and_seed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = init_database(&path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let restricted: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE name = 'restricted'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(restricted, 1);

        let settings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM application_settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(settings, 1);
    }

    #[tokio::test]
    async fn test_connection_supports_regexp_and_case_sensitive_like() {
        let dir = tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();

        let matched: bool = sqlx::query_scalar("SELECT 'see collection[12]' REGEXP ?")
            .bind(crate::versioning::references::collection_reference_pattern(12))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(matched);

        let like: bool = sqlx::query_scalar("SELECT 'Cat' LIKE 'cat'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(!like);
    }
}
