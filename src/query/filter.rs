//! Validation of a parse tree against the registry.
//!
//! Every leaf is checked and every problem recorded; a predicate is produced
//! only when the whole tree is valid.

use regex::Regex;
use serde_json::Value;

use super::expr::{FilterExpr, Leaf};
use super::predicate::{Comparison, Predicate, SqlValue};
use super::QueryErrors;
use crate::models::time;
use crate::schema::{
    FieldDescriptor, FieldKind, ModelName, NotPermitted, Operator, ValueType, RELATION_OPERATORS,
    SCALAR_OPERATORS,
};

/// Compile `expr` for a search over `root`, recording problems in `errors`.
pub fn compile(root: ModelName, expr: &FilterExpr, errors: &mut QueryErrors) -> Option<Predicate> {
    match expr {
        FilterExpr::Leaf(leaf) => compile_leaf(root, leaf, errors),
        FilterExpr::And(parts) => compile_all(root, parts, errors).map(Predicate::And),
        FilterExpr::Or(parts) => compile_all(root, parts, errors).map(Predicate::Or),
        FilterExpr::Not(inner) => compile(root, inner, errors).map(|p| Predicate::Not(Box::new(p))),
    }
}

fn compile_all(
    root: ModelName,
    parts: &[FilterExpr],
    errors: &mut QueryErrors,
) -> Option<Vec<Predicate>> {
    // Compile every operand before deciding, so that all errors are reported.
    let compiled: Vec<Option<Predicate>> = parts.iter().map(|p| compile(root, p, errors)).collect();
    compiled.into_iter().collect()
}

fn compile_leaf(root: ModelName, leaf: &Leaf, errors: &mut QueryErrors) -> Option<Predicate> {
    let Some(model) = ModelName::parse(&leaf.model) else {
        errors.add(
            leaf.model.clone(),
            format!("Searching on the {} model is not permitted", leaf.model),
        );
        let denied = NotPermitted::attribute(&leaf.model, &leaf.attribute);
        errors.add(denied.key, denied.message);
        return None;
    };

    let join = if model == root {
        None
    } else {
        let relation = root.join_relation(model);
        if relation.is_none() {
            errors.add(
                model.as_str(),
                format!(
                    "Searching the {} model by joining on the {} model is not possible",
                    root, model
                ),
            );
        }
        relation
    };

    let Some(field) = model.field(&leaf.attribute) else {
        let denied = NotPermitted::attribute(model.as_str(), &leaf.attribute);
        errors.add(denied.key, denied.message);
        return None;
    };

    let condition = match &leaf.sub_attribute {
        None => compile_condition(model, field, &leaf.operator, &leaf.value, errors),
        Some(sub_attribute) => {
            let Some(target) = field.target() else {
                errors.add(
                    format!("{}.{}", model, field.name),
                    format!(
                        "The {} attribute of the {} model does not represent a relation.",
                        field.name, model
                    ),
                );
                return None;
            };
            let Some(sub_field) = target.field(sub_attribute) else {
                let denied = NotPermitted::attribute(target.as_str(), sub_attribute);
                errors.add(denied.key, denied.message);
                return None;
            };
            compile_condition(target, sub_field, &leaf.operator, &leaf.value, errors)
                .map(|inner| Predicate::related(field, Some(inner)))
        }
    }?;

    if model == root {
        Some(condition)
    } else {
        join.map(|relation| Predicate::related(relation, Some(condition)))
    }
}

fn compile_condition(
    model: ModelName,
    field: &'static FieldDescriptor,
    operator: &str,
    value: &Value,
    errors: &mut QueryErrors,
) -> Option<Predicate> {
    let path = format!("{}.{}", model, field.name);
    let allowed = if field.is_relation() {
        RELATION_OPERATORS
    } else {
        SCALAR_OPERATORS
    };
    let Some(op) = Operator::parse(operator).filter(|op| allowed.contains(op)) else {
        errors.add(
            format!("{}.{}", path, operator),
            format!("The relation {} is not permitted for {}", operator, path),
        );
        return None;
    };

    match field.kind {
        FieldKind::Scalar { value_type, column } => {
            compile_scalar(&path, value_type, op, value, errors)
                .map(|comparison| Predicate::compare(column, comparison))
        }
        FieldKind::ToOne { fk, .. } => {
            let comparison = null_test(&path, op, value, errors)?;
            Some(Predicate::compare(crate::schema::Column::Plain(fk), comparison))
        }
        FieldKind::ToMany { .. } => {
            let present = Predicate::related(field, None);
            Some(match null_test(&path, op, value, errors)? {
                Comparison::IsNull => Predicate::Not(Box::new(present)),
                _ => present,
            })
        }
    }
}

/// Relations may only be compared with null.
fn null_test(
    path: &str,
    op: Operator,
    value: &Value,
    errors: &mut QueryErrors,
) -> Option<Comparison> {
    match (op, value) {
        (Operator::Eq, Value::Null) => Some(Comparison::IsNull),
        (Operator::Ne, Value::Null) => Some(Comparison::IsNotNull),
        _ => {
            invalid_expression(path, op, value, errors);
            None
        }
    }
}

fn compile_scalar(
    path: &str,
    value_type: ValueType,
    op: Operator,
    value: &Value,
    errors: &mut QueryErrors,
) -> Option<Comparison> {
    match op {
        Operator::Eq | Operator::Ne if value.is_null() => Some(if op == Operator::Eq {
            Comparison::IsNull
        } else {
            Comparison::IsNotNull
        }),
        Operator::Like => match value.as_str() {
            Some(pattern) => Some(Comparison::Like(pattern.to_string())),
            None => {
                invalid_expression(path, op, value, errors);
                None
            }
        },
        Operator::Regex => match value.as_str() {
            Some(pattern) if Regex::new(pattern).is_ok() => {
                Some(Comparison::Regex(pattern.to_string()))
            }
            Some(_) => {
                errors.add(
                    format!("{}.{}", path, op.as_str()),
                    "The regular expression provided is invalid.",
                );
                None
            }
            None => {
                invalid_expression(path, op, value, errors);
                None
            }
        },
        Operator::In => {
            let Some(items) = value.as_array() else {
                invalid_expression(path, op, value, errors);
                return None;
            };
            let converted: Vec<Option<SqlValue>> = items
                .iter()
                .map(|item| convert_value(path, value_type, op, item, errors))
                .collect();
            converted.into_iter().collect::<Option<Vec<_>>>().map(Comparison::In)
        }
        _ => {
            let converted = convert_value(path, value_type, op, value, errors)?;
            let sql_op = op.sql_comparison()?;
            Some(Comparison::Binary(sql_op, converted))
        }
    }
}

/// Convert a JSON value to a bindable value of the attribute's type.
fn convert_value(
    path: &str,
    value_type: ValueType,
    op: Operator,
    value: &Value,
    errors: &mut QueryErrors,
) -> Option<SqlValue> {
    if value.is_null() {
        return Some(SqlValue::Null);
    }
    match value_type {
        ValueType::Text => match value {
            Value::String(s) => Some(SqlValue::Text(s.clone())),
            Value::Number(n) => Some(SqlValue::Text(n.to_string())),
            _ => {
                invalid_expression(path, op, value, errors);
                None
            }
        },
        ValueType::Integer => match value {
            Value::Number(n) => match n.as_i64() {
                Some(int) => Some(SqlValue::Integer(int)),
                None => n.as_f64().map(SqlValue::Real),
            },
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(int) => Some(SqlValue::Integer(int)),
                Err(_) => {
                    invalid_expression(path, op, value, errors);
                    None
                }
            },
            _ => {
                invalid_expression(path, op, value, errors);
                None
            }
        },
        ValueType::Date => match value.as_str().and_then(time::parse_date) {
            Some(date) => Some(SqlValue::Text(time::format_date(date))),
            None => {
                errors.add(
                    format!("date {}", plain_repr(value)),
                    "Date search parameters must be valid ISO 8601 date strings.",
                );
                None
            }
        },
        ValueType::Datetime => match value.as_str().and_then(time::parse_datetime) {
            Some(datetime) => Some(SqlValue::Text(time::format_datetime(datetime))),
            None => {
                errors.add(
                    format!("datetime {}", plain_repr(value)),
                    "Datetime search parameters must be valid ISO 8601 datetime strings.",
                );
                None
            }
        },
    }
}

fn invalid_expression(path: &str, op: Operator, value: &Value, errors: &mut QueryErrors) {
    errors.add(
        format!("{}.{}", path, op.as_str()),
        format!(
            "Invalid filter expression: {}.{}({})",
            path,
            op.as_str(),
            value_repr(value)
        ),
    );
}

/// Client-facing rendering of a value inside an error message.
pub(crate) fn value_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => format!("'{}'", s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(value_repr).collect::<Vec<_>>().join(", ")
        ),
        other => other.to_string(),
    }
}

fn plain_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => value_repr(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(root: ModelName, query: Value) -> (Option<Predicate>, QueryErrors) {
        let mut errors = QueryErrors::default();
        let expr = FilterExpr::parse(&query).expect("well-formed");
        let predicate = compile(root, &expr, &mut errors);
        (predicate, errors)
    }

    #[test]
    fn test_valid_query_has_no_errors() {
        let (predicate, errors) = run(
            ModelName::Form,
            json!(["and", [
                ["Form", "transcription", "like", "%cat%"],
                ["not", ["Tag", "name", "=", "archive"]],
                ["Form", "enterer", "first_name", "regex", "^A"],
                ["Form", "date_elicited", ">", "2010-01-01"],
                ["Form", "id", "in", [1, 2, 3]],
                ["Form", "tags", "!=", null]
            ]]),
        );
        assert!(errors.is_empty(), "{:?}", errors);
        assert!(predicate.is_some());
    }

    #[test]
    fn test_forbidden_attribute_is_keyed_by_path() {
        let (predicate, errors) = run(ModelName::Form, json!(["Form", "password", "=", "x"]));
        assert!(predicate.is_none());
        assert_eq!(
            errors.get("Form.password"),
            Some("Searching on Form.password is not permitted")
        );
    }

    #[test]
    fn test_disallowed_operator_is_keyed_by_operator() {
        let (_, errors) = run(ModelName::Form, json!(["Form", "tags", "like", "%a%"]));
        assert_eq!(
            errors.get("Form.tags.like"),
            Some("The relation like is not permitted for Form.tags")
        );

        let (_, errors) = run(ModelName::Form, json!(["Form", "transcription", "contains", "a"]));
        assert_eq!(
            errors.get("Form.transcription.contains"),
            Some("The relation contains is not permitted for Form.transcription")
        );
    }

    #[test]
    fn test_errors_are_collected_not_short_circuited() {
        let (_, errors) = run(
            ModelName::Form,
            json!(["or", [
                ["Form", "nope", "=", 1],
                ["Gloss", "gloss", "=", "x"],
                ["Form", "datetime_modified", ">", "last week"],
                ["Speaker", "first_name", "=", "Ann"]
            ]]),
        );
        assert!(errors.get("Form.nope").is_some());
        assert_eq!(
            errors.get("Gloss"),
            Some("Searching on the Gloss model is not permitted")
        );
        assert_eq!(
            errors.get("datetime last week"),
            Some("Datetime search parameters must be valid ISO 8601 datetime strings.")
        );
        assert_eq!(
            errors.get("Speaker"),
            Some("Searching the Form model by joining on the Speaker model is not possible")
        );
    }

    #[test]
    fn test_bad_date_is_keyed_by_value() {
        let (_, errors) = run(ModelName::File, json!(["File", "date_elicited", "=", "01/02/2003"]));
        assert_eq!(
            errors.get("date 01/02/2003"),
            Some("Date search parameters must be valid ISO 8601 date strings.")
        );
    }

    #[test]
    fn test_like_on_dates_uses_raw_pattern() {
        let (predicate, errors) = run(ModelName::Form, json!(["Form", "date_elicited", "like", "2012-%"]));
        assert!(errors.is_empty());
        match predicate.unwrap() {
            Predicate::Compare { comparison, .. } => {
                assert_eq!(comparison, Comparison::Like("2012-%".into()))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_in_requires_array() {
        let (_, errors) = run(ModelName::Form, json!(["Form", "transcription", "in_", null]));
        assert_eq!(
            errors.get("Form.transcription.in_"),
            Some("Invalid filter expression: Form.transcription.in_(None)")
        );
        let (_, errors) = run(ModelName::Form, json!(["Form", "id", "in", "1,2"]));
        assert_eq!(
            errors.get("Form.id.in_"),
            Some("Invalid filter expression: Form.id.in_('1,2')")
        );
    }

    #[test]
    fn test_relation_only_compares_with_null() {
        let (_, errors) = run(ModelName::Form, json!(["Form", "enterer", "=", 3]));
        assert_eq!(
            errors.get("Form.enterer.="),
            Some("Invalid filter expression: Form.enterer.=(3)")
        );

        let (predicate, errors) = run(ModelName::Form, json!(["Form", "files", "=", null]));
        assert!(errors.is_empty());
        assert!(matches!(predicate, Some(Predicate::Not(_))));
    }

    #[test]
    fn test_second_hop_requires_relation() {
        let (_, errors) = run(
            ModelName::Form,
            json!(["Form", "transcription", "name", "=", "x"]),
        );
        assert_eq!(
            errors.get("Form.transcription"),
            Some("The transcription attribute of the Form model does not represent a relation.")
        );
    }

    #[test]
    fn test_invalid_regex() {
        let (_, errors) = run(ModelName::Form, json!(["Form", "transcription", "regex", "(unclosed"]));
        assert_eq!(
            errors.get("Form.transcription.regex"),
            Some("The regular expression provided is invalid.")
        );
    }

    #[test]
    fn test_null_equality_becomes_is_null() {
        let (predicate, _) = run(ModelName::Collection, json!(["Collection", "date_elicited", "!=", null]));
        assert_eq!(
            predicate,
            Some(Predicate::compare(
                crate::schema::Column::Plain("date_elicited"),
                Comparison::IsNotNull
            ))
        );
    }
}
