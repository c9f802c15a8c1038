//! Append-only backups of versioned records.

use serde::{Deserialize, Serialize};

use super::{CollectionSnapshot, FormSnapshot, UserMini};

/// A form as it existed just before an update or delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormBackup {
    pub id: i64,
    pub form_id: i64,
    pub uuid: String,
    #[serde(default)]
    pub backuper: Option<UserMini>,
    #[serde(flatten)]
    pub snapshot: FormSnapshot,
}

/// A collection as it existed just before an update or delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionBackup {
    pub id: i64,
    pub collection_id: i64,
    pub uuid: String,
    #[serde(default)]
    pub backuper: Option<UserMini>,
    #[serde(flatten)]
    pub snapshot: CollectionSnapshot,
}

/// Response of the form history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FormHistory {
    pub form: Option<super::Form>,
    pub previous_versions: Vec<FormBackup>,
}

/// Response of the collection history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionHistory {
    pub collection: Option<super::Collection>,
    pub previous_versions: Vec<CollectionBackup>,
}
