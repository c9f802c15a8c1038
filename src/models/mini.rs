//! Mini-dicts: the reduced views of related records embedded in other records
//! and in backup snapshots.
//!
//! Every field except the id defaults, so snapshots written before a field
//! existed still deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMini {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerMini {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub dialect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMini {
    pub id: i64,
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMini {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMini {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationMini {
    pub id: i64,
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub grammaticality: String,
}

/// A form as embedded in the collections that contain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormMini {
    pub id: i64,
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub morpheme_break: String,
    #[serde(default)]
    pub morpheme_gloss: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{mini_dict_fields, ModelName};
    use serde_json::Value;

    fn keys(value: Value) -> Vec<String> {
        let mut keys: Vec<String> = value
            .as_object()
            .expect("mini-dicts serialize to objects")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn whitelist(model: ModelName) -> Vec<String> {
        let mut fields: Vec<String> = mini_dict_fields(model)
            .iter()
            .map(|f| f.to_string())
            .collect();
        fields.sort();
        fields
    }

    #[test]
    fn test_mini_dicts_match_whitelist() {
        let user = serde_json::to_value(UserMini {
            id: 1,
            first_name: String::new(),
            last_name: String::new(),
            role: String::new(),
        })
        .unwrap();
        assert_eq!(keys(user), whitelist(ModelName::User));

        let source = serde_json::to_value(SourceMini {
            id: 1,
            source_type: "book".into(),
            key: String::new(),
            author: String::new(),
            title: String::new(),
            year: None,
        })
        .unwrap();
        assert_eq!(keys(source), whitelist(ModelName::Source));

        let file = serde_json::to_value(FileMini {
            id: 1,
            name: String::new(),
            filename: String::new(),
            mime_type: String::new(),
            size: None,
            url: String::new(),
        })
        .unwrap();
        assert_eq!(keys(file), whitelist(ModelName::File));

        let form = serde_json::to_value(FormMini {
            id: 1,
            transcription: String::new(),
            morpheme_break: String::new(),
            morpheme_gloss: String::new(),
        })
        .unwrap();
        assert_eq!(keys(form), whitelist(ModelName::Form));
    }

    #[test]
    fn test_old_snapshot_fields_default() {
        let speaker: SpeakerMini = serde_json::from_str(r#"{"id": 4}"#).unwrap();
        assert_eq!(speaker.id, 4);
        assert!(speaker.dialect.is_empty());
    }
}
