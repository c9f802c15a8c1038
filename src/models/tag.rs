//! Tags, speakers and sources: the unversioned lookup records.

use serde::{Deserialize, Serialize};

use super::{SourceMini, SpeakerMini, TagMini};

/// Name of the reserved tag that gates visibility.
pub const RESTRICTED_TAG: &str = "restricted";

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub datetime_modified: String,
}

impl Tag {
    pub fn mini(&self) -> TagMini {
        TagMini {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Speaker {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub dialect: String,
    pub datetime_modified: String,
}

impl Speaker {
    pub fn mini(&self) -> SpeakerMini {
        SpeakerMini {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            dialect: self.dialect.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub dialect: String,
}

/// A bibliographic source.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    #[serde(rename = "type")]
    pub source_type: String,
    pub key: String,
    pub author: String,
    pub title: String,
    pub year: Option<i64>,
    pub journal: String,
    pub datetime_modified: String,
}

impl Source {
    pub fn mini(&self) -> SourceMini {
        SourceMini {
            id: self.id,
            source_type: self.source_type.clone(),
            key: self.key.clone(),
            author: self.author.clone(),
            title: self.title.clone(),
            year: self.year,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceInput {
    #[serde(default, rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub journal: String,
}

/// True when the reserved restricted tag is among `tags`.
pub fn has_restricted_tag(tags: &[TagMini]) -> bool {
    tags.iter().any(|tag| tag.name == RESTRICTED_TAG)
}
