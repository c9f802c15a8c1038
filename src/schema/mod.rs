//! Searchable attribute registry.
//!
//! A closed set of models, each with a static table of field descriptors.
//! The query interpreter, the order-by resolver, the visibility filter and the
//! `new_search` endpoints all read from here; nothing else decides what may be
//! searched.

mod operator;
mod tables;

pub use operator::*;

use std::collections::BTreeMap;

use serde::Serialize;

/// Every model the query language can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ModelName {
    Form,
    File,
    Collection,
    Tag,
    Translation,
    User,
    Speaker,
    Source,
    FormBackup,
    CollectionBackup,
    FormSearch,
}

impl ModelName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Form" => Some(ModelName::Form),
            "File" => Some(ModelName::File),
            "Collection" => Some(ModelName::Collection),
            "Tag" => Some(ModelName::Tag),
            "Translation" => Some(ModelName::Translation),
            "User" => Some(ModelName::User),
            "Speaker" => Some(ModelName::Speaker),
            "Source" => Some(ModelName::Source),
            "FormBackup" => Some(ModelName::FormBackup),
            "CollectionBackup" => Some(ModelName::CollectionBackup),
            "FormSearch" => Some(ModelName::FormSearch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Form => "Form",
            ModelName::File => "File",
            ModelName::Collection => "Collection",
            ModelName::Tag => "Tag",
            ModelName::Translation => "Translation",
            ModelName::User => "User",
            ModelName::Speaker => "Speaker",
            ModelName::Source => "Source",
            ModelName::FormBackup => "FormBackup",
            ModelName::CollectionBackup => "CollectionBackup",
            ModelName::FormSearch => "FormSearch",
        }
    }

    /// Backing SQLite table.
    pub fn table(&self) -> &'static str {
        match self {
            ModelName::Form => "forms",
            ModelName::File => "files",
            ModelName::Collection => "collections",
            ModelName::Tag => "tags",
            ModelName::Translation => "translations",
            ModelName::User => "users",
            ModelName::Speaker => "speakers",
            ModelName::Source => "sources",
            ModelName::FormBackup => "form_backups",
            ModelName::CollectionBackup => "collection_backups",
            ModelName::FormSearch => "form_searches",
        }
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        match self {
            ModelName::Form => tables::FORM,
            ModelName::File => tables::FILE,
            ModelName::Collection => tables::COLLECTION,
            ModelName::Tag => tables::TAG,
            ModelName::Translation => tables::TRANSLATION,
            ModelName::User => tables::USER,
            ModelName::Speaker => tables::SPEAKER,
            ModelName::Source => tables::SOURCE,
            ModelName::FormBackup => tables::FORM_BACKUP,
            ModelName::CollectionBackup => tables::COLLECTION_BACKUP,
            ModelName::FormSearch => tables::FORM_SEARCH,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// The relation of `self` through which `other` may be joined in a search.
    pub fn join_relation(&self, other: ModelName) -> Option<&'static FieldDescriptor> {
        let relation = tables::JOINS
            .iter()
            .find(|(root, joined, _)| *root == *self && *joined == other)
            .map(|(_, _, relation)| *relation)?;
        self.field(relation)
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic type of a scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Integer,
    Date,
    Datetime,
}

/// Where a scalar lives in its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// An ordinary column.
    Plain(&'static str),
    /// A JSON path into the `snapshot` column of a backup table.
    Json(&'static str),
}

impl Column {
    /// SQL expression for this column under a table alias.
    pub fn sql(&self, alias: &str) -> String {
        match self {
            Column::Plain(name) => format!("{}.{}", alias, name),
            Column::Json(path) => format!("json_extract({}.snapshot, '{}')", alias, path),
        }
    }
}

/// How a to-many relation is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// A link table with a column pointing at the owner and one at the target.
    Table {
        table: &'static str,
        local: &'static str,
        foreign: &'static str,
    },
    /// The target rows carry a foreign key to the owner.
    Child(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar {
        value_type: ValueType,
        column: Column,
    },
    ToOne {
        target: ModelName,
        fk: &'static str,
    },
    ToMany {
        target: ModelName,
        link: Link,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn is_relation(&self) -> bool {
        !matches!(self.kind, FieldKind::Scalar { .. })
    }

    pub fn target(&self) -> Option<ModelName> {
        match self.kind {
            FieldKind::Scalar { .. } => None,
            FieldKind::ToOne { target, .. } | FieldKind::ToMany { target, .. } => Some(target),
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self.kind {
            FieldKind::Scalar { value_type, .. } => Some(value_type),
            _ => None,
        }
    }

    /// Storage of a scalar field; relations store nothing on their own row.
    pub fn column(&self) -> Option<Column> {
        match self.kind {
            FieldKind::Scalar { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// Marker returned for a (model, attribute) pair that may not be searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotPermitted {
    pub key: String,
    pub message: String,
}

impl NotPermitted {
    pub fn attribute(model: &str, attribute: &str) -> Self {
        let key = format!("{}.{}", model, attribute);
        Self {
            message: format!("Searching on {} is not permitted", key),
            key,
        }
    }
}

/// Names of the searchable attributes and relations of `model`.
pub fn allowed_attributes(model: ModelName) -> Vec<&'static str> {
    model.fields().iter().map(|f| f.name).collect()
}

/// Operators allowed on `model.attribute`.
pub fn allowed_operators(
    model: ModelName,
    attribute: &str,
) -> Result<&'static [Operator], NotPermitted> {
    let field = model
        .field(attribute)
        .ok_or_else(|| NotPermitted::attribute(model.as_str(), attribute))?;
    Ok(if field.is_relation() {
        RELATION_OPERATORS
    } else {
        SCALAR_OPERATORS
    })
}

/// Core fields kept when a record of `model` is embedded in another record.
pub fn mini_dict_fields(model: ModelName) -> &'static [&'static str] {
    match model {
        ModelName::User => &["id", "first_name", "last_name", "role"],
        ModelName::Speaker => &["id", "first_name", "last_name", "dialect"],
        ModelName::Source => &["id", "type", "key", "author", "title", "year"],
        ModelName::Tag => &["id", "name"],
        ModelName::File => &["id", "name", "filename", "mime_type", "size", "url"],
        ModelName::Translation => &["id", "transcription", "grammaticality"],
        ModelName::Form => &["id", "transcription", "morpheme_break", "morpheme_gloss"],
        ModelName::Collection
        | ModelName::FormBackup
        | ModelName::CollectionBackup
        | ModelName::FormSearch => &["id"],
    }
}

/// Attribute to operator table advertised to search clients.
pub fn search_parameters(model: ModelName) -> BTreeMap<&'static str, &'static [Operator]> {
    model
        .fields()
        .iter()
        .map(|field| {
            let operators = if field.is_relation() {
                RELATION_OPERATORS
            } else {
                SCALAR_OPERATORS
            };
            (field.name, operators)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[ModelName] = &[
        ModelName::Form,
        ModelName::File,
        ModelName::Collection,
        ModelName::Tag,
        ModelName::Translation,
        ModelName::User,
        ModelName::Speaker,
        ModelName::Source,
        ModelName::FormBackup,
        ModelName::CollectionBackup,
        ModelName::FormSearch,
    ];

    #[test]
    fn test_model_names_round_trip() {
        for model in ALL {
            assert_eq!(ModelName::parse(model.as_str()), Some(*model));
        }
        assert_eq!(ModelName::parse("Gloss"), None);
        assert_eq!(ModelName::parse("form"), None);
    }

    #[test]
    fn test_every_model_has_id() {
        for model in ALL {
            let id = model.field("id").expect("id is searchable");
            assert_eq!(id.value_type(), Some(ValueType::Integer));
        }
    }

    #[test]
    fn test_backup_models_have_no_relations() {
        for model in [ModelName::FormBackup, ModelName::CollectionBackup] {
            for field in model.fields() {
                assert!(!field.is_relation(), "{}.{}", model, field.name);
            }
        }
    }

    #[test]
    fn test_relations_allow_only_equality() {
        assert_eq!(
            allowed_operators(ModelName::Form, "tags").unwrap(),
            RELATION_OPERATORS
        );
        assert_eq!(
            allowed_operators(ModelName::Form, "transcription").unwrap(),
            SCALAR_OPERATORS
        );
    }

    #[test]
    fn test_unknown_attribute_is_not_permitted() {
        let err = allowed_operators(ModelName::Form, "password").unwrap_err();
        assert_eq!(err.key, "Form.password");
        assert_eq!(err.message, "Searching on Form.password is not permitted");
    }

    #[test]
    fn test_join_map() {
        let files = ModelName::Form.join_relation(ModelName::File).unwrap();
        assert_eq!(files.name, "files");
        assert_eq!(
            ModelName::Collection
                .join_relation(ModelName::Form)
                .map(|f| f.name),
            Some("forms")
        );
        assert!(ModelName::Form.join_relation(ModelName::User).is_none());
        assert!(ModelName::Tag.join_relation(ModelName::Form).is_none());
    }

    #[test]
    fn test_join_relations_target_the_joined_model() {
        for root in ALL {
            for joined in ALL {
                if let Some(field) = root.join_relation(*joined) {
                    assert_eq!(field.target(), Some(*joined));
                }
            }
        }
    }

    #[test]
    fn test_backup_attributes_read_snapshot() {
        let field = ModelName::FormBackup.field("transcription").unwrap();
        assert_eq!(
            field.column().unwrap().sql("b"),
            "json_extract(b.snapshot, '$.transcription')"
        );
        let form_id = ModelName::FormBackup.field("form_id").unwrap();
        assert_eq!(form_id.column().unwrap().sql("b"), "b.form_id");
    }

    #[test]
    fn test_search_parameters_cover_all_attributes() {
        let params = search_parameters(ModelName::Collection);
        assert_eq!(params.len(), allowed_attributes(ModelName::Collection).len());
        assert_eq!(params["forms"], RELATION_OPERATORS);
        assert!(!params.contains_key("contents_unpacked"));
    }
}
