//! Forms: the versioned linguistic examples.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    has_restricted_tag, FileMini, FormMini, SourceMini, SpeakerMini, TagMini, TranslationMini,
    UserMini,
};

/// Everything about a form except its identity.
///
/// This is both the body of the live representation and the payload stored
/// in every form backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSnapshot {
    #[serde(default)]
    pub transcription: String,
    #[serde(default)]
    pub phonetic_transcription: String,
    #[serde(default)]
    pub narrow_phonetic_transcription: String,
    #[serde(default)]
    pub morpheme_break: String,
    #[serde(default)]
    pub morpheme_gloss: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub speaker_comments: String,
    #[serde(default)]
    pub grammaticality: String,
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
    pub verifier: Option<UserMini>,
    #[serde(default)]
    pub speaker: Option<SpeakerMini>,
    #[serde(default)]
    pub source: Option<SourceMini>,
    #[serde(default)]
    pub translations: Vec<TranslationMini>,
    #[serde(default)]
    pub tags: Vec<TagMini>,
    #[serde(default)]
    pub files: Vec<FileMini>,
}

impl FormSnapshot {
    pub fn is_restricted(&self) -> bool {
        has_restricted_tag(&self.tags)
    }

    /// The user-editable content, ignoring timestamps and translation ids.
    pub fn content(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.remove("datetime_modified");
            object.remove("datetime_entered");
            if let Some(Value::Array(translations)) = object.get_mut("translations") {
                for translation in translations.iter_mut() {
                    if let Some(t) = translation.as_object_mut() {
                        t.remove("id");
                    }
                }
            }
        }
        value
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Form {
    pub id: i64,
    pub uuid: String,
    #[serde(flatten)]
    pub snapshot: FormSnapshot,
}

impl Form {
    pub fn mini(&self) -> FormMini {
        FormMini {
            id: self.id,
            transcription: self.snapshot.transcription.clone(),
            morpheme_break: self.snapshot.morpheme_break.clone(),
            morpheme_gloss: self.snapshot.morpheme_gloss.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranslationInput {
    pub transcription: String,
    pub grammaticality: String,
}

/// Request body for creating or replacing a form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormInput {
    pub transcription: String,
    pub phonetic_transcription: String,
    pub narrow_phonetic_transcription: String,
    pub morpheme_break: String,
    pub morpheme_gloss: String,
    pub comments: String,
    pub speaker_comments: String,
    pub grammaticality: String,
    pub date_elicited: Option<String>,
    pub elicitor: Option<i64>,
    pub verifier: Option<i64>,
    pub speaker: Option<i64>,
    pub source: Option<i64>,
    pub translations: Vec<TranslationInput>,
    pub tags: Vec<i64>,
    pub files: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> FormSnapshot {
        serde_json::from_value(serde_json::json!({
            "transcription": "chien",
            "datetime_modified": "2020-01-01T00:00:00.000000",
            "translations": [{"id": 3, "transcription": "dog", "grammaticality": ""}]
        }))
        .unwrap()
    }

    #[test]
    fn test_content_ignores_timestamps_and_translation_ids() {
        let a = snapshot();
        let mut b = snapshot();
        b.datetime_modified = "2021-01-01T00:00:00.000000".into();
        b.translations[0].id = 9;
        assert_eq!(a.content(), b.content());

        b.translations[0].transcription = "hound".into();
        assert_ne!(a.content(), b.content());
    }

    #[test]
    fn test_snapshot_flattens_into_form() {
        let form = Form {
            id: 7,
            uuid: "u".into(),
            snapshot: snapshot(),
        };
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["transcription"], "chien");
        assert!(value["enterer"].is_null());
    }
}
