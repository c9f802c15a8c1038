//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Forms,
//! collections, files and backups live in their own files; this one holds the
//! unversioned lookup records.

use std::collections::BTreeMap;

use sqlx::{Row, SqlitePool};

use super::records::{load_user, user_from_row};
use crate::access::AccessSettings;
use crate::auth::hash_secret;
use crate::errors::AppError;
use crate::models::{
    time, ApplicationSettings, CreatedUser, Role, SettingsInput, Source, SourceInput, Speaker,
    SpeakerInput, Tag, TagInput, User, UserInput, RESTRICTED_TAG,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name, email, affiliation, role, datetime_modified FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// A user together with the SHA-256 digest of its API secret.
    pub async fn get_user_credentials(&self, id: i64) -> Result<Option<(User, String)>, AppError> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, affiliation, role, datetime_modified, api_secret_hash FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| (user_from_row(&row), row.get("api_secret_hash"))))
    }

    /// Create a user. The returned API key is never shown again.
    pub async fn create_user(&self, input: &UserInput) -> Result<CreatedUser, AppError> {
        let mut errors = BTreeMap::new();
        if input.first_name.trim().is_empty() {
            errors.insert("first_name".to_string(), "Please enter a value".to_string());
        }
        if input.last_name.trim().is_empty() {
            errors.insert("last_name".to_string(), "Please enter a value".to_string());
        }
        let role = Role::parse(&input.role);
        if role.is_none() {
            errors.insert(
                "role".to_string(),
                "Value must be one of: administrator; contributor; viewer".to_string(),
            );
        }
        let Some(role) = role.filter(|_| errors.is_empty()) else {
            return Err(AppError::Validation(errors));
        };

        let secret = uuid::Uuid::new_v4().simple().to_string();
        let id = self
            .insert_user(
                input.first_name.trim(),
                input.last_name.trim(),
                &input.email,
                &input.affiliation,
                role,
                &secret,
            )
            .await?;

        let mut conn = self.pool.acquire().await?;
        let user = load_user(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", id)))?;
        Ok(CreatedUser {
            api_key: format!("{}.{}", user.id, secret),
            user,
        })
    }

    async fn insert_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        affiliation: &str,
        role: Role,
        secret: &str,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO users (first_name, last_name, email, affiliation, role, api_secret_hash, datetime_modified) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(affiliation)
        .bind(role.as_str())
        .bind(hash_secret(secret))
        .bind(time::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Create the first administrator with the given secret when the user
    /// table is empty. Returns the administrator's API key if one was made.
    pub async fn ensure_administrator(&self, secret: &str) -> Result<Option<String>, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(None);
        }

        let id = self
            .insert_user("Admin", "Administrator", "", "", Role::Administrator, secret)
            .await?;
        tracing::info!("Created initial administrator with id {}", id);
        Ok(Some(format!("{}.{}", id, secret)))
    }

    // ==================== TAG OPERATIONS ====================

    /// List all tags.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, AppError> {
        let rows =
            sqlx::query("SELECT id, name, description, datetime_modified FROM tags ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.iter().map(tag_from_row).collect())
    }

    /// Get a tag by ID.
    pub async fn get_tag(&self, id: i64) -> Result<Option<Tag>, AppError> {
        let row = sqlx::query("SELECT id, name, description, datetime_modified FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(tag_from_row))
    }

    /// Create a new tag.
    pub async fn create_tag(&self, input: &TagInput) -> Result<Tag, AppError> {
        let name = self.validate_tag_name(input, None).await?;

        let result = sqlx::query(
            "INSERT INTO tags (name, description, datetime_modified) VALUES (?, ?, ?)",
        )
        .bind(&name)
        .bind(&input.description)
        .bind(time::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_tag(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Tag {} vanished after insert", id)))
    }

    /// Update a tag. The restricted tag keeps its name.
    pub async fn update_tag(&self, id: i64, input: &TagInput) -> Result<Tag, AppError> {
        let existing = self
            .get_tag(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("There is no tag with id {}", id)))?;

        let name = self.validate_tag_name(input, Some(id)).await?;
        if existing.name == RESTRICTED_TAG && name != RESTRICTED_TAG {
            return Err(AppError::BadRequest(
                "The restricted tag cannot be renamed.".to_string(),
            ));
        }
        if existing.name == name && existing.description == input.description {
            return Err(AppError::BadRequest(
                crate::errors::NOT_NEW_MESSAGE.to_string(),
            ));
        }

        sqlx::query("UPDATE tags SET name = ?, description = ?, datetime_modified = ? WHERE id = ?")
            .bind(&name)
            .bind(&input.description)
            .bind(time::next_modified(&existing.datetime_modified))
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.get_tag(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("There is no tag with id {}", id)))
    }

    /// Delete a tag and its links. The restricted tag cannot be deleted.
    pub async fn delete_tag(&self, id: i64) -> Result<Tag, AppError> {
        let existing = self
            .get_tag(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("There is no tag with id {}", id)))?;
        if existing.name == RESTRICTED_TAG {
            return Err(AppError::BadRequest(
                "The restricted tag cannot be deleted.".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        for link in ["form_tags", "file_tags", "collection_tags"] {
            sqlx::query(&format!("DELETE FROM {} WHERE tag_id = ?", link))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(existing)
    }

    async fn validate_tag_name(&self, input: &TagInput, own_id: Option<i64>) -> Result<String, AppError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::field("name", "Please enter a value"));
        }
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
        match taken {
            Some(other) if Some(other) != own_id => Err(AppError::field(
                "name",
                "The submitted value for Tag.name is not unique.",
            )),
            _ => Ok(name),
        }
    }

    // ==================== SPEAKER OPERATIONS ====================

    /// List all speakers.
    pub async fn list_speakers(&self) -> Result<Vec<Speaker>, AppError> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name, dialect, datetime_modified FROM speakers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Speaker {
                id: row.get("id"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                dialect: row.get("dialect"),
                datetime_modified: row.get("datetime_modified"),
            })
            .collect())
    }

    /// Create a new speaker.
    pub async fn create_speaker(&self, input: &SpeakerInput) -> Result<Speaker, AppError> {
        let mut errors = BTreeMap::new();
        if input.first_name.trim().is_empty() {
            errors.insert("first_name".to_string(), "Please enter a value".to_string());
        }
        if input.last_name.trim().is_empty() {
            errors.insert("last_name".to_string(), "Please enter a value".to_string());
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let now = time::now();
        let result = sqlx::query(
            "INSERT INTO speakers (first_name, last_name, dialect, datetime_modified) VALUES (?, ?, ?, ?)",
        )
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(&input.dialect)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Speaker {
            id: result.last_insert_rowid(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            dialect: input.dialect.clone(),
            datetime_modified: now,
        })
    }

    // ==================== SOURCE OPERATIONS ====================

    /// List all sources.
    pub async fn list_sources(&self) -> Result<Vec<Source>, AppError> {
        let rows = sqlx::query(
            "SELECT id, source_type, source_key, author, title, year, journal, datetime_modified FROM sources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Source {
                id: row.get("id"),
                source_type: row.get("source_type"),
                key: row.get("source_key"),
                author: row.get("author"),
                title: row.get("title"),
                year: row.get("year"),
                journal: row.get("journal"),
                datetime_modified: row.get("datetime_modified"),
            })
            .collect())
    }

    /// Create a new source. Keys are unique.
    pub async fn create_source(&self, input: &SourceInput) -> Result<Source, AppError> {
        let mut errors = BTreeMap::new();
        if input.source_type.trim().is_empty() {
            errors.insert("type".to_string(), "Please enter a value".to_string());
        }
        if input.key.trim().is_empty() {
            errors.insert("key".to_string(), "Please enter a value".to_string());
        } else {
            let taken: Option<i64> =
                sqlx::query_scalar("SELECT id FROM sources WHERE source_key = ?")
                    .bind(input.key.trim())
                    .fetch_optional(&self.pool)
                    .await?;
            if taken.is_some() {
                errors.insert(
                    "key".to_string(),
                    "The submitted value for Source.key is not unique.".to_string(),
                );
            }
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let now = time::now();
        let result = sqlx::query(
            "INSERT INTO sources (source_type, source_key, author, title, year, journal, datetime_modified) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(input.source_type.trim())
        .bind(input.key.trim())
        .bind(&input.author)
        .bind(&input.title)
        .bind(input.year)
        .bind(&input.journal)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Source {
            id: result.last_insert_rowid(),
            source_type: input.source_type.trim().to_string(),
            key: input.key.trim().to_string(),
            author: input.author.clone(),
            title: input.title.clone(),
            year: input.year,
            journal: input.journal.clone(),
            datetime_modified: now,
        })
    }

    // ==================== SETTINGS OPERATIONS ====================

    /// Get the application settings.
    pub async fn get_settings(&self) -> Result<ApplicationSettings, AppError> {
        let row = sqlx::query(
            "SELECT object_language_name, unrestricted_users, datetime_modified FROM application_settings WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let unrestricted: String = row.get("unrestricted_users");
        Ok(ApplicationSettings {
            object_language_name: row.get("object_language_name"),
            unrestricted_users: parse_id_list(&unrestricted),
            datetime_modified: row.get("datetime_modified"),
        })
    }

    /// Settings that affect record visibility.
    pub async fn access_settings(&self) -> Result<AccessSettings, AppError> {
        let settings = self.get_settings().await?;
        Ok(AccessSettings {
            unrestricted_users: settings.unrestricted_users,
        })
    }

    /// Replace the application settings. Every unrestricted user must exist.
    pub async fn update_settings(
        &self,
        input: &SettingsInput,
    ) -> Result<ApplicationSettings, AppError> {
        let mut unrestricted = input.unrestricted_users.clone();
        unrestricted.sort_unstable();
        unrestricted.dedup();

        let mut conn = self.pool.acquire().await?;
        for id in &unrestricted {
            if load_user(&mut conn, *id).await?.is_none() {
                return Err(AppError::field(
                    "unrestricted_users",
                    format!("There is no user with id {}", id),
                ));
            }
        }

        let existing = self.get_settings().await?;
        sqlx::query(
            "UPDATE application_settings SET object_language_name = ?, unrestricted_users = ?, datetime_modified = ? WHERE id = 1",
        )
        .bind(&input.object_language_name)
        .bind(serde_json::to_string(&unrestricted)?)
        .bind(time::next_modified(&existing.datetime_modified))
        .execute(&mut *conn)
        .await?;

        self.get_settings().await
    }
}

fn tag_from_row(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        datetime_modified: row.get("datetime_modified"),
    }
}

fn parse_id_list(s: &str) -> Vec<i64> {
    serde_json::from_str(s).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    async fn repo() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        (dir, Repository::new(pool))
    }

    #[tokio::test]
    async fn test_ensure_administrator_only_once() {
        let (_dir, repo) = repo().await;
        let key = repo.ensure_administrator("s3cret").await.unwrap();
        assert_eq!(key.as_deref(), Some("1.s3cret"));
        assert!(repo.ensure_administrator("other").await.unwrap().is_none());

        let (user, digest) = repo.get_user_credentials(1).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Administrator);
        assert_ne!(digest, "s3cret");
        assert_eq!(digest, hash_secret("s3cret"));

        let stored: String = sqlx::query_scalar("SELECT api_secret_hash FROM users WHERE id = 1")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert!(!stored.contains("s3cret"));
        assert_eq!(stored.len(), 64);
    }

    #[tokio::test]
    async fn test_restricted_tag_is_protected() {
        let (_dir, repo) = repo().await;
        let restricted = repo
            .list_tags()
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.name == RESTRICTED_TAG)
            .unwrap();

        let rename = TagInput {
            name: "open".into(),
            description: String::new(),
        };
        assert!(matches!(
            repo.update_tag(restricted.id, &rename).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            repo.delete_tag(restricted.id).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_tag_names_are_unique() {
        let (_dir, repo) = repo().await;
        let input = TagInput {
            name: "archive".into(),
            description: String::new(),
        };
        repo.create_tag(&input).await.unwrap();
        match repo.create_tag(&input).await {
            Err(AppError::Validation(errors)) => assert!(errors.contains_key("name")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_settings_reject_unknown_users() {
        let (_dir, repo) = repo().await;
        repo.ensure_administrator("k").await.unwrap();

        let bad = SettingsInput {
            object_language_name: "Blackfoot".into(),
            unrestricted_users: vec![1, 99],
        };
        assert!(matches!(
            repo.update_settings(&bad).await,
            Err(AppError::Validation(_))
        ));

        let good = SettingsInput {
            object_language_name: "Blackfoot".into(),
            unrestricted_users: vec![1, 1],
        };
        let settings = repo.update_settings(&good).await.unwrap();
        assert_eq!(settings.unrestricted_users, vec![1]);
        assert_eq!(repo.access_settings().await.unwrap().unrestricted_users, vec![1]);
    }
}
