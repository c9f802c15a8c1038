//! ORDER BY resolution.
//!
//! Two policies exist for a bad order-by expression. Index listings fall back
//! to the primary key silently; search requests report `OrderByError`.

use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};

use super::QueryErrors;
use crate::schema::{Column, ModelName, ValueType};

pub const ORDER_BY_ERROR_KEY: &str = "OrderByError";
pub const ORDER_BY_ERROR_MESSAGE: &str = "The provided order by expression was invalid.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Anything but `desc` sorts ascending.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("desc") => Direction::Desc,
            _ => Direction::Asc,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    column: Column,
    case_insensitive: bool,
    direction: Direction,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::primary_key()
    }
}

impl OrderBy {
    pub fn primary_key() -> Self {
        OrderBy {
            column: Column::Plain("id"),
            case_insensitive: false,
            direction: Direction::Asc,
        }
    }

    /// Resolve `model.attribute` on the searched model, or `None` if invalid.
    pub fn resolve(
        root: ModelName,
        model: &str,
        attribute: &str,
        direction: Option<&str>,
    ) -> Option<Self> {
        let model = ModelName::parse(model).filter(|m| *m == root)?;
        let field = model.field(attribute)?;
        Some(OrderBy {
            column: field.column()?,
            case_insensitive: field.value_type() == Some(ValueType::Text),
            direction: Direction::parse(direction),
        })
    }

    /// Resolve an `[model, attribute, direction?]` array.
    fn from_value(root: ModelName, value: &Value) -> Option<Self> {
        let parts = value.as_array()?;
        let model = parts.first()?.as_str()?;
        let attribute = parts.get(1)?.as_str()?;
        let direction = parts.get(2).and_then(Value::as_str);
        Self::resolve(root, model, attribute, direction)
    }

    /// Index listings: any invalid expression falls back to the primary key.
    pub fn lenient(root: ModelName, value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::primary_key(),
            Some(value) => Self::from_value(root, value).unwrap_or_else(Self::primary_key),
        }
    }

    /// Explicit order-by requests: invalid expressions are reported.
    pub fn strict(root: ModelName, value: Option<&Value>, errors: &mut QueryErrors) -> Self {
        match value {
            None | Some(Value::Null) => Self::primary_key(),
            Some(value) => Self::from_value(root, value).unwrap_or_else(|| {
                errors.add(ORDER_BY_ERROR_KEY, ORDER_BY_ERROR_MESSAGE);
                Self::primary_key()
            }),
        }
    }

    /// Append the ORDER BY clause; the primary key breaks ties.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        builder.push(" ORDER BY ");
        builder.push(self.column.sql(alias));
        if self.case_insensitive {
            builder.push(" COLLATE NOCASE");
        }
        builder.push(format!(" {}", self.direction.sql()));
        if self.column != Column::Plain("id") {
            builder.push(format!(", {}.id ASC", alias));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(order: &OrderBy) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("");
        order.push_sql(&mut builder, "root");
        builder.sql().to_string()
    }

    #[test]
    fn test_default_is_primary_key() {
        assert_eq!(render(&OrderBy::default()), " ORDER BY root.id ASC");
    }

    #[test]
    fn test_text_columns_sort_case_insensitively() {
        let order = OrderBy::lenient(
            ModelName::Form,
            Some(&json!(["Form", "transcription", "desc"])),
        );
        assert_eq!(
            render(&order),
            " ORDER BY root.transcription COLLATE NOCASE DESC, root.id ASC"
        );
    }

    #[test]
    fn test_unknown_direction_falls_back_to_asc() {
        let order = OrderBy::lenient(ModelName::Form, Some(&json!(["Form", "id", "sideways"])));
        assert_eq!(render(&order), " ORDER BY root.id ASC");
    }

    #[test]
    fn test_lenient_ignores_invalid_expression() {
        let order = OrderBy::lenient(ModelName::Form, Some(&json!(["Form", "nonexistent"])));
        assert_eq!(order, OrderBy::primary_key());
    }

    #[test]
    fn test_strict_reports_invalid_expression() {
        let mut errors = QueryErrors::default();
        let order = OrderBy::strict(
            ModelName::Form,
            Some(&json!(["Form", "nonexistent"])),
            &mut errors,
        );
        assert_eq!(order, OrderBy::primary_key());
        assert_eq!(errors.get(ORDER_BY_ERROR_KEY), Some(ORDER_BY_ERROR_MESSAGE));
    }

    #[test]
    fn test_relations_and_other_models_are_not_orderable() {
        assert!(OrderBy::resolve(ModelName::Form, "Form", "tags", None).is_none());
        assert!(OrderBy::resolve(ModelName::Form, "Tag", "name", None).is_none());
        assert!(OrderBy::resolve(ModelName::Form, "Form", "transcription", None).is_some());
    }

    #[test]
    fn test_backup_columns_order_through_snapshot() {
        let order = OrderBy::resolve(ModelName::FormBackup, "FormBackup", "transcription", Some("asc"))
            .unwrap();
        assert_eq!(
            render(&order),
            " ORDER BY json_extract(root.snapshot, '$.transcription') COLLATE NOCASE ASC, root.id ASC"
        );
    }
}
