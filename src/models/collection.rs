//! Collections: versioned documents that embed forms and other collections
//! by textual reference.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{has_restricted_tag, FileMini, FormMini, SourceMini, SpeakerMini, TagMini, UserMini};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub collection_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub markup_language: String,
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub contents_unpacked: String,
    #[serde(default)]
    pub date_elicited: Option<String>,
    #[serde(default)]
    pub datetime_entered: String,
    #[serde(default)]
    pub datetime_modified: String,
    #[serde(default)]
    pub enterer: Option<UserMini>,
    #[serde(default)]
    pub elicitor: Option<UserMini>,
    #[serde(default)]
    pub speaker: Option<SpeakerMini>,
    #[serde(default)]
    pub source: Option<SourceMini>,
    #[serde(default)]
    pub tags: Vec<TagMini>,
    #[serde(default)]
    pub files: Vec<FileMini>,
    #[serde(default)]
    pub forms: Vec<FormMini>,
}

impl CollectionSnapshot {
    pub fn is_restricted(&self) -> bool {
        has_restricted_tag(&self.tags)
    }

    /// The stored content, ignoring timestamps.
    pub fn content(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.remove("datetime_modified");
            object.remove("datetime_entered");
        }
        value
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub id: i64,
    pub uuid: String,
    #[serde(flatten)]
    pub snapshot: CollectionSnapshot,
}

/// Request body for creating or replacing a collection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectionInput {
    pub title: String,
    #[serde(rename = "type")]
    pub collection_type: String,
    pub url: String,
    pub description: String,
    pub markup_language: String,
    pub contents: String,
    pub date_elicited: Option<String>,
    pub elicitor: Option<i64>,
    pub speaker: Option<i64>,
    pub source: Option<i64>,
    pub tags: Vec<i64>,
    pub files: Vec<i64>,
}
