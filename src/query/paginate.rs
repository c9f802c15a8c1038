//! Pagination of result sets.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub page: i64,
    pub items_per_page: i64,
    /// Supplied by the client; echoed instead of being recomputed.
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub count: i64,
    pub page: i64,
    pub items_per_page: i64,
}

/// Either every matching record or one page of them.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    All(Vec<T>),
    Page { items: Vec<T>, paginator: PageInfo },
}

impl<T> Listing<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Listing::All(items) | Listing::Page { items, .. } => items,
        }
    }
}

impl Paginator {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.items_per_page)
    }

    pub fn info(&self, count: i64) -> PageInfo {
        PageInfo {
            count,
            page: self.page,
            items_per_page: self.items_per_page,
        }
    }

    /// Read the `paginator` member of a search request.
    pub fn from_value(
        value: Option<&Value>,
        max_items_per_page: i64,
    ) -> Result<Option<Self>, BTreeMap<String, String>> {
        let object = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(object)) => object,
            Some(_) => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "paginator".to_string(),
                    "The paginator must be an object".to_string(),
                );
                return Err(errors);
            }
        };
        let field = |name: &str| match object.get(name) {
            None | Some(Value::Null) => RawField::Missing,
            Some(Value::Number(n)) => n.as_i64().map(RawField::Int).unwrap_or(RawField::Invalid),
            Some(Value::String(s)) => s.trim().parse().map(RawField::Int).unwrap_or(RawField::Invalid),
            Some(_) => RawField::Invalid,
        };
        Self::build(
            field("page"),
            field("items_per_page"),
            field("count"),
            max_items_per_page,
        )
    }

    /// Read `page` and `items_per_page` query-string parameters.
    pub fn from_params(
        page: Option<&str>,
        items_per_page: Option<&str>,
        max_items_per_page: i64,
    ) -> Result<Option<Self>, BTreeMap<String, String>> {
        let field = |raw: Option<&str>| match raw.map(str::trim) {
            None | Some("") => RawField::Missing,
            Some(s) => s.parse().map(RawField::Int).unwrap_or(RawField::Invalid),
        };
        Self::build(
            field(page),
            field(items_per_page),
            RawField::Missing,
            max_items_per_page,
        )
    }

    fn build(
        page: RawField,
        items_per_page: RawField,
        count: RawField,
        max_items_per_page: i64,
    ) -> Result<Option<Self>, BTreeMap<String, String>> {
        if matches!((page, items_per_page), (RawField::Missing, RawField::Missing)) {
            return Ok(None);
        }

        let mut errors = BTreeMap::new();
        let page = positive(&mut errors, "page", page);
        let items_per_page = positive(&mut errors, "items_per_page", items_per_page);
        if let Some(k) = items_per_page {
            if k > max_items_per_page {
                errors.insert(
                    "items_per_page".to_string(),
                    format!("Please enter a number that is {} or smaller", max_items_per_page),
                );
            }
        }
        let count = match count {
            RawField::Missing => None,
            RawField::Int(n) if n >= 0 => Some(n),
            _ => {
                errors.insert(
                    "count".to_string(),
                    "Please enter a number that is 0 or greater".to_string(),
                );
                None
            }
        };

        match (page, items_per_page) {
            (Some(page), Some(items_per_page)) if errors.is_empty() => Ok(Some(Paginator {
                page,
                items_per_page,
                count,
            })),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RawField {
    Missing,
    Int(i64),
    Invalid,
}

fn positive(errors: &mut BTreeMap<String, String>, name: &str, raw: RawField) -> Option<i64> {
    match raw {
        RawField::Int(n) if n >= 1 => Some(n),
        RawField::Missing => {
            errors.insert(name.to_string(), "Please enter a value".to_string());
            None
        }
        _ => {
            errors.insert(
                name.to_string(),
                "Please enter a number that is 1 or greater".to_string(),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_paginator() {
        assert_eq!(Paginator::from_value(None, 100), Ok(None));
        assert_eq!(Paginator::from_params(None, None, 100), Ok(None));
    }

    #[test]
    fn test_offset_slices_pages() {
        let paginator = Paginator::from_value(Some(&json!({"page": 3, "items_per_page": 10})), 100)
            .unwrap()
            .unwrap();
        assert_eq!(paginator.offset(), 20);
        assert_eq!(paginator.count, None);
    }

    #[test]
    fn test_count_is_kept() {
        let paginator = Paginator::from_value(
            Some(&json!({"page": 1, "items_per_page": 2, "count": 999})),
            100,
        )
        .unwrap()
        .unwrap();
        assert_eq!(paginator.count, Some(999));
    }

    #[test]
    fn test_invalid_values() {
        let errors = Paginator::from_value(Some(&json!({"page": 0, "items_per_page": "x"})), 100)
            .unwrap_err();
        assert_eq!(errors["page"], "Please enter a number that is 1 or greater");
        assert_eq!(errors["items_per_page"], "Please enter a number that is 1 or greater");

        let errors = Paginator::from_params(Some("1"), None, 100).unwrap_err();
        assert_eq!(errors["items_per_page"], "Please enter a value");

        let errors = Paginator::from_params(Some("1"), Some("500"), 100).unwrap_err();
        assert_eq!(errors["items_per_page"], "Please enter a number that is 100 or smaller");
    }

    #[test]
    fn test_listing_shapes() {
        let all: Listing<i64> = Listing::All(vec![1, 2]);
        assert_eq!(serde_json::to_value(&all).unwrap(), json!([1, 2]));

        let page = Listing::Page {
            items: vec![3],
            paginator: PageInfo {
                count: 3,
                page: 2,
                items_per_page: 2,
            },
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({"items": [3], "paginator": {"count": 3, "page": 2, "items_per_page": 2}})
        );
    }
}
