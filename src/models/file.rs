//! File metadata records. Files carry no binary payload here.

use serde::{Deserialize, Serialize};

use super::{has_restricted_tag, FileMini, SpeakerMini, TagMini, UserMini};

#[derive(Debug, Clone, Serialize)]
pub struct File {
    pub id: i64,
    pub filename: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<i64>,
    pub description: String,
    pub utterance_type: String,
    pub url: String,
    pub date_elicited: Option<String>,
    pub datetime_entered: String,
    pub datetime_modified: String,
    pub enterer: Option<UserMini>,
    pub elicitor: Option<UserMini>,
    pub speaker: Option<SpeakerMini>,
    pub parent_file: Option<FileMini>,
    pub tags: Vec<TagMini>,
}

impl File {
    pub fn mini(&self) -> FileMini {
        FileMini {
            id: self.id,
            name: self.name.clone(),
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            url: self.url.clone(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        has_restricted_tag(&self.tags)
    }
}

/// Request body for creating or replacing a file record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileInput {
    pub filename: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<i64>,
    pub description: String,
    pub utterance_type: String,
    pub url: String,
    pub date_elicited: Option<String>,
    pub elicitor: Option<i64>,
    pub speaker: Option<i64>,
    pub parent_file: Option<i64>,
    pub tags: Vec<i64>,
}
