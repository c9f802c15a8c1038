//! Static field tables, one per model.

use super::{Column, FieldDescriptor, FieldKind, Link, ModelName, ValueType};

const fn scalar(name: &'static str, value_type: ValueType) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::Scalar {
            value_type,
            column: Column::Plain(name),
        },
    }
}

const fn renamed(name: &'static str, column: &'static str, value_type: ValueType) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::Scalar {
            value_type,
            column: Column::Plain(column),
        },
    }
}

const fn snapshot(name: &'static str, path: &'static str, value_type: ValueType) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::Scalar {
            value_type,
            column: Column::Json(path),
        },
    }
}

const fn to_one(name: &'static str, target: ModelName, fk: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::ToOne { target, fk },
    }
}

const fn to_many(
    name: &'static str,
    target: ModelName,
    table: &'static str,
    local: &'static str,
    foreign: &'static str,
) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::ToMany {
            target,
            link: Link::Table {
                table,
                local,
                foreign,
            },
        },
    }
}

use ModelName as M;
use ValueType::{Date, Datetime, Integer, Text};

pub(super) const FORM: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("uuid", Text),
    scalar("transcription", Text),
    scalar("phonetic_transcription", Text),
    scalar("narrow_phonetic_transcription", Text),
    scalar("morpheme_break", Text),
    scalar("morpheme_gloss", Text),
    scalar("comments", Text),
    scalar("speaker_comments", Text),
    scalar("grammaticality", Text),
    scalar("date_elicited", Date),
    scalar("datetime_entered", Datetime),
    scalar("datetime_modified", Datetime),
    to_one("enterer", M::User, "enterer_id"),
    to_one("elicitor", M::User, "elicitor_id"),
    to_one("verifier", M::User, "verifier_id"),
    to_one("speaker", M::Speaker, "speaker_id"),
    to_one("source", M::Source, "source_id"),
    FieldDescriptor {
        name: "translations",
        kind: FieldKind::ToMany {
            target: M::Translation,
            link: Link::Child("form_id"),
        },
    },
    to_many("tags", M::Tag, "form_tags", "form_id", "tag_id"),
    to_many("files", M::File, "form_files", "form_id", "file_id"),
    to_many("collections", M::Collection, "collection_forms", "form_id", "collection_id"),
];

pub(super) const FILE: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("filename", Text),
    scalar("name", Text),
    scalar("mime_type", Text),
    scalar("size", Integer),
    scalar("description", Text),
    scalar("utterance_type", Text),
    scalar("url", Text),
    scalar("date_elicited", Date),
    scalar("datetime_entered", Datetime),
    scalar("datetime_modified", Datetime),
    to_one("enterer", M::User, "enterer_id"),
    to_one("elicitor", M::User, "elicitor_id"),
    to_one("speaker", M::Speaker, "speaker_id"),
    to_one("parent_file", M::File, "parent_file_id"),
    to_many("tags", M::Tag, "file_tags", "file_id", "tag_id"),
    to_many("forms", M::Form, "form_files", "file_id", "form_id"),
    to_many("collections", M::Collection, "collection_files", "file_id", "collection_id"),
];

pub(super) const COLLECTION: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("uuid", Text),
    scalar("title", Text),
    renamed("type", "collection_type", Text),
    scalar("url", Text),
    scalar("description", Text),
    scalar("markup_language", Text),
    scalar("contents", Text),
    scalar("date_elicited", Date),
    scalar("datetime_entered", Datetime),
    scalar("datetime_modified", Datetime),
    to_one("enterer", M::User, "enterer_id"),
    to_one("elicitor", M::User, "elicitor_id"),
    to_one("speaker", M::Speaker, "speaker_id"),
    to_one("source", M::Source, "source_id"),
    to_many("tags", M::Tag, "collection_tags", "collection_id", "tag_id"),
    to_many("files", M::File, "collection_files", "collection_id", "file_id"),
    to_many("forms", M::Form, "collection_forms", "collection_id", "form_id"),
];

pub(super) const TAG: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("name", Text),
    scalar("description", Text),
    scalar("datetime_modified", Datetime),
];

pub(super) const TRANSLATION: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("transcription", Text),
    scalar("grammaticality", Text),
    scalar("datetime_modified", Datetime),
    to_one("form", M::Form, "form_id"),
];

pub(super) const USER: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("first_name", Text),
    scalar("last_name", Text),
    scalar("email", Text),
    scalar("affiliation", Text),
    scalar("role", Text),
    scalar("datetime_modified", Datetime),
];

pub(super) const SPEAKER: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("first_name", Text),
    scalar("last_name", Text),
    scalar("dialect", Text),
    scalar("datetime_modified", Datetime),
];

pub(super) const SOURCE: &[FieldDescriptor] = &[
    scalar("id", Integer),
    renamed("type", "source_type", Text),
    renamed("key", "source_key", Text),
    scalar("author", Text),
    scalar("title", Text),
    scalar("year", Integer),
    scalar("journal", Text),
    scalar("datetime_modified", Datetime),
];

// Backup relations are embedded JSON, searchable as text.
pub(super) const FORM_BACKUP: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("uuid", Text),
    scalar("form_id", Integer),
    scalar("datetime_modified", Datetime),
    snapshot("transcription", "$.transcription", Text),
    snapshot("phonetic_transcription", "$.phonetic_transcription", Text),
    snapshot("narrow_phonetic_transcription", "$.narrow_phonetic_transcription", Text),
    snapshot("morpheme_break", "$.morpheme_break", Text),
    snapshot("morpheme_gloss", "$.morpheme_gloss", Text),
    snapshot("comments", "$.comments", Text),
    snapshot("speaker_comments", "$.speaker_comments", Text),
    snapshot("grammaticality", "$.grammaticality", Text),
    snapshot("date_elicited", "$.date_elicited", Date),
    snapshot("datetime_entered", "$.datetime_entered", Datetime),
    snapshot("enterer", "$.enterer", Text),
    snapshot("elicitor", "$.elicitor", Text),
    snapshot("verifier", "$.verifier", Text),
    snapshot("speaker", "$.speaker", Text),
    snapshot("source", "$.source", Text),
    snapshot("translations", "$.translations", Text),
    snapshot("tags", "$.tags", Text),
    snapshot("files", "$.files", Text),
];

pub(super) const COLLECTION_BACKUP: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("uuid", Text),
    scalar("collection_id", Integer),
    scalar("datetime_modified", Datetime),
    snapshot("title", "$.title", Text),
    snapshot("type", "$.type", Text),
    snapshot("url", "$.url", Text),
    snapshot("description", "$.description", Text),
    snapshot("markup_language", "$.markup_language", Text),
    snapshot("contents", "$.contents", Text),
    snapshot("date_elicited", "$.date_elicited", Date),
    snapshot("datetime_entered", "$.datetime_entered", Datetime),
    snapshot("enterer", "$.enterer", Text),
    snapshot("elicitor", "$.elicitor", Text),
    snapshot("speaker", "$.speaker", Text),
    snapshot("source", "$.source", Text),
    snapshot("tags", "$.tags", Text),
    snapshot("files", "$.files", Text),
    snapshot("forms", "$.forms", Text),
];

// The stored query is searchable as its JSON text.
pub(super) const FORM_SEARCH: &[FieldDescriptor] = &[
    scalar("id", Integer),
    scalar("name", Text),
    scalar("search", Text),
    scalar("description", Text),
    scalar("datetime_modified", Datetime),
    to_one("enterer", M::User, "enterer_id"),
];

/// Root model, joinable model, relation of the root used for the join.
pub(super) const JOINS: &[(ModelName, ModelName, &str)] = &[
    (M::Form, M::File, "files"),
    (M::Form, M::Tag, "tags"),
    (M::Form, M::Collection, "collections"),
    (M::Form, M::Translation, "translations"),
    (M::File, M::Tag, "tags"),
    (M::File, M::Form, "forms"),
    (M::File, M::Collection, "collections"),
    (M::Collection, M::Form, "forms"),
    (M::Collection, M::File, "files"),
    (M::Collection, M::Tag, "tags"),
];
