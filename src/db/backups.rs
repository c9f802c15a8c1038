//! Read access to form and collection backups.

use super::records::{load_collection_backup, load_form_backup};
use super::Repository;
use crate::access::{visible, Requester};
use crate::errors::AppError;
use crate::models::{CollectionBackup, FormBackup};

impl Repository {
    /// Get a form backup the requester may see.
    pub async fn get_form_backup(
        &self,
        id: i64,
        requester: &Requester,
    ) -> Result<FormBackup, AppError> {
        let mut conn = self.pool.acquire().await?;
        let backup = load_form_backup(&mut conn, id).await?.ok_or_else(|| {
            AppError::NotFound(format!("There is no form backup with id {}", id))
        })?;
        if !visible(&backup, requester) {
            return Err(AppError::Forbidden);
        }
        Ok(backup)
    }

    /// Get a collection backup the requester may see.
    pub async fn get_collection_backup(
        &self,
        id: i64,
        requester: &Requester,
    ) -> Result<CollectionBackup, AppError> {
        let mut conn = self.pool.acquire().await?;
        let backup = load_collection_backup(&mut conn, id).await?.ok_or_else(|| {
            AppError::NotFound(format!("There is no collection backup with id {}", id))
        })?;
        if !visible(&backup, requester) {
            return Err(AppError::Forbidden);
        }
        Ok(backup)
    }
}
