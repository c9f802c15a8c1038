//! Query filter interpreter.
//!
//! Turns the JSON search language into a validated [`Predicate`] plus an
//! [`OrderBy`], collecting every problem into [`QueryErrors`] instead of
//! failing on the first one. The interpreter knows nothing about users; the
//! visibility predicate is added where queries are executed.

mod expr;
mod filter;
mod order;
mod paginate;
mod predicate;

pub use expr::{FilterExpr, Leaf, Malformed};
pub use order::{Direction, OrderBy, ORDER_BY_ERROR_KEY, ORDER_BY_ERROR_MESSAGE};
pub use paginate::{Listing, PageInfo, Paginator};
pub use predicate::{Comparison, Predicate, SqlValue};

use std::collections::BTreeMap;

use serde_json::Value;

use crate::schema::ModelName;

pub const MALFORMED_KEY: &str = "Malformed query error";
pub const MALFORMED_MESSAGE: &str = "The submitted query was malformed";

/// Accumulated search errors: path or value key to message, plus a flag for
/// queries whose shape could not be understood at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryErrors {
    pub malformed: bool,
    errors: BTreeMap<String, String>,
}

impl QueryErrors {
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(key.into(), message.into());
    }

    pub fn mark_malformed(&mut self) {
        self.malformed = true;
    }

    pub fn is_empty(&self) -> bool {
        !self.malformed && self.errors.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        if self.malformed && key == MALFORMED_KEY {
            return Some(MALFORMED_MESSAGE);
        }
        self.errors.get(key).map(String::as_str)
    }

    /// The client-facing error map.
    pub fn into_map(self) -> BTreeMap<String, String> {
        let mut errors = self.errors;
        if self.malformed {
            errors.insert(MALFORMED_KEY.to_string(), MALFORMED_MESSAGE.to_string());
        }
        errors
    }
}

/// A compiled search over one model.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub model: ModelName,
    pub filter: Option<Predicate>,
    pub order_by: OrderBy,
}

impl SearchQuery {
    /// Every record of `model`, in the given order.
    pub fn listing(model: ModelName, order_by: OrderBy) -> Self {
        SearchQuery {
            model,
            filter: None,
            order_by,
        }
    }

    /// Compile the `query` member of a search request:
    /// `{"filter": <expression>, "order_by": [model, attribute, direction?]}`.
    pub fn compile(model: ModelName, query: &Value) -> Result<Self, QueryErrors> {
        let mut errors = QueryErrors::default();

        let filter = match query.get("filter").map(FilterExpr::parse) {
            Some(Ok(expr)) => filter::compile(model, &expr, &mut errors),
            Some(Err(Malformed)) | None => {
                errors.mark_malformed();
                None
            }
        };
        let order_by = OrderBy::strict(model, query.get("order_by"), &mut errors);

        match filter {
            Some(filter) if errors.is_empty() => Ok(SearchQuery {
                model,
                filter: Some(filter),
                order_by,
            }),
            _ => {
                if errors.is_empty() {
                    errors.mark_malformed();
                }
                Err(errors)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_valid_search() {
        let query = SearchQuery::compile(
            ModelName::Form,
            &json!({
                "filter": ["Form", "transcription", "like", "%a%"],
                "order_by": ["Form", "transcription", "desc"]
            }),
        )
        .unwrap();
        assert!(query.filter.is_some());
        assert_ne!(query.order_by, OrderBy::primary_key());
    }

    #[test]
    fn test_missing_filter_is_malformed() {
        let errors = SearchQuery::compile(ModelName::Form, &json!({})).unwrap_err();
        assert!(errors.malformed);
        assert_eq!(
            errors.into_map().get(MALFORMED_KEY).map(String::as_str),
            Some(MALFORMED_MESSAGE)
        );
    }

    #[test]
    fn test_malformed_shape_is_flagged_separately() {
        let errors =
            SearchQuery::compile(ModelName::Form, &json!({"filter": ["and", "oops"]})).unwrap_err();
        let map = errors.into_map();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(MALFORMED_KEY));
    }

    #[test]
    fn test_order_by_error_alongside_filter_errors() {
        let errors = SearchQuery::compile(
            ModelName::Form,
            &json!({
                "filter": ["Form", "secret", "=", 1],
                "order_by": ["Form", "secret"]
            }),
        )
        .unwrap_err();
        assert!(!errors.malformed);
        assert_eq!(errors.get(ORDER_BY_ERROR_KEY), Some(ORDER_BY_ERROR_MESSAGE));
        assert!(errors.get("Form.secret").is_some());
    }
}
