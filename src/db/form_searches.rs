//! Saved form searches. The stored query is validated as a form search
//! before it is saved, so running it later only fails if the registry changed.

use serde_json::Value;
use sqlx::SqliteConnection;

use super::records::load_form_search;
use super::Repository;
use crate::access::Requester;
use crate::errors::{AppError, NOT_NEW_MESSAGE};
use crate::models::{time, Form, FormSearch, FormSearchInput};
use crate::query::{Listing, Paginator, SearchQuery};
use crate::schema::ModelName;

pub const INVALID_SEARCH_MESSAGE: &str = "The submitted query was invalid";

impl Repository {
    pub async fn get_form_search(&self, id: i64) -> Result<FormSearch, AppError> {
        let mut conn = self.pool.acquire().await?;
        load_form_search(&mut conn, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Save a form search entered by the requester.
    pub async fn create_form_search(
        &self,
        input: &FormSearchInput,
        requester: &Requester,
    ) -> Result<FormSearch, AppError> {
        let mut tx = self.pool.begin().await?;
        let name = validate(&mut tx, input, None).await?;

        let result = sqlx::query(
            "INSERT INTO form_searches (name, search, description, enterer_id, datetime_modified) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&name)
        .bind(serde_json::to_string(&input.search)?)
        .bind(&input.description)
        .bind(requester.id())
        .bind(time::now())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        let search = load_form_search(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("Form search {} created by user {}", id, requester.id());
        Ok(search)
    }

    pub async fn update_form_search(
        &self,
        id: i64,
        input: &FormSearchInput,
        requester: &Requester,
    ) -> Result<FormSearch, AppError> {
        let mut tx = self.pool.begin().await?;
        let old = load_form_search(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let name = validate(&mut tx, input, Some(id)).await?;
        if old.name == name && old.search == input.search && old.description == input.description
        {
            return Err(AppError::BadRequest(NOT_NEW_MESSAGE.to_string()));
        }

        sqlx::query(
            "UPDATE form_searches SET name = ?, search = ?, description = ?, datetime_modified = ? WHERE id = ?",
        )
        .bind(&name)
        .bind(serde_json::to_string(&input.search)?)
        .bind(&input.description)
        .bind(time::next_modified(&old.datetime_modified))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let search = load_form_search(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        tx.commit().await?;

        tracing::info!("Form search {} updated by user {}", id, requester.id());
        Ok(search)
    }

    /// Delete a form search; administrators or its enterer only.
    pub async fn delete_form_search(
        &self,
        id: i64,
        requester: &Requester,
    ) -> Result<FormSearch, AppError> {
        let mut conn = self.pool.acquire().await?;
        let old = load_form_search(&mut conn, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if !requester.can_delete(old.enterer.as_ref().map(|u| u.id)) {
            return Err(AppError::Forbidden);
        }

        sqlx::query("DELETE FROM form_searches WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        tracing::info!("Form search {} deleted by user {}", id, requester.id());
        Ok(old)
    }

    /// Run a saved search over the forms the requester may see.
    pub async fn run_form_search(
        &self,
        id: i64,
        requester: &Requester,
        paginator: Option<&Paginator>,
    ) -> Result<Listing<Form>, AppError> {
        let saved = self.get_form_search(id).await?;
        let query = SearchQuery::compile(ModelName::Form, &saved.search)?;
        self.search_forms(&query, requester, paginator).await
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("There is no form search with id {}", id))
}

/// Check name and query. Returns the trimmed name.
async fn validate(
    conn: &mut SqliteConnection,
    input: &FormSearchInput,
    own_id: Option<i64>,
) -> Result<String, AppError> {
    let mut errors = super::inputs::FieldErrors::new();

    let name = input.name.trim().to_string();
    if name.is_empty() {
        errors.insert("name".to_string(), "Please enter a value".to_string());
    } else {
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM form_searches WHERE name = ?")
            .bind(&name)
            .fetch_optional(&mut *conn)
            .await?;
        if matches!(taken, Some(other) if Some(other) != own_id) {
            errors.insert(
                "name".to_string(),
                "The submitted value for FormSearch.name is not unique.".to_string(),
            );
        }
    }

    let compiles = !matches!(input.search, Value::Null)
        && SearchQuery::compile(ModelName::Form, &input.search).is_ok();
    if !compiles {
        errors.insert("search".to_string(), INVALID_SEARCH_MESSAGE.to_string());
    }

    if errors.is_empty() {
        Ok(name)
    } else {
        Err(AppError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessSettings;
    use crate::db::init_database;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Repository, Requester) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        let repo = Repository::new(pool);
        repo.ensure_administrator("s3cret").await.unwrap();
        let (user, _) = repo.get_user_credentials(1).await.unwrap().unwrap();
        let requester = Requester::new(user, &AccessSettings::default());
        (dir, repo, requester)
    }

    fn input(name: &str, search: Value) -> FormSearchInput {
        FormSearchInput {
            name: name.into(),
            search,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_invalid_query_is_rejected() {
        let (_dir, repo, requester) = setup().await;
        let bad = input("bad", json!({ "filter": ["Form", "nope", "=", 1] }));
        match repo.create_form_search(&bad, &requester).await {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors.get("search").map(String::as_str), Some(INVALID_SEARCH_MESSAGE))
            }
            other => panic!("unexpected {:?}", other.map(|s| s.id)),
        }
    }

    #[tokio::test]
    async fn test_names_are_unique_and_updates_must_be_new() {
        let (_dir, repo, requester) = setup().await;
        let query = json!({ "filter": ["Form", "transcription", "like", "%a%"] });
        let saved = repo
            .create_form_search(&input("with a", query.clone()), &requester)
            .await
            .unwrap();
        assert_eq!(saved.search, query);
        assert_eq!(saved.enterer.as_ref().map(|u| u.id), Some(1));

        assert!(matches!(
            repo.create_form_search(&input(" with a ", query.clone()), &requester).await,
            Err(AppError::Validation(errors)) if errors.contains_key("name")
        ));
        assert!(matches!(
            repo.update_form_search(saved.id, &input("with a", query), &requester).await,
            Err(AppError::BadRequest(message)) if message == NOT_NEW_MESSAGE
        ));
    }
}
