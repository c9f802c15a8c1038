//! REST API module.
//!
//! Handlers return the bare resource (or a `{"items", "paginator"}` page) on
//! success and an [`AppError`] envelope otherwise.

mod backups;
mod collections;
mod files;
mod form_searches;
mod forms;
mod lookups;
mod tags;

pub use backups::*;
pub use collections::*;
pub use files::*;
pub use form_searches::*;
pub use forms::*;
pub use lookups::*;
pub use tags::*;

use axum::body::Bytes;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::access::Requester;
use crate::errors::{AppError, JSON_DECODE_MESSAGE};
use crate::query::{OrderBy, Paginator, QueryErrors, SearchQuery};
use crate::schema::{search_parameters, ModelName};

/// Handler result: JSON on success, an error envelope otherwise.
pub type ApiResult<T> = Result<Json<T>, AppError>;

/// Decode a JSON request body.
pub(crate) fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        AppError::BadRequest(JSON_DECODE_MESSAGE.to_string())
    })
}

/// Administrators and contributors may write; viewers may not.
pub(crate) fn require_writer(requester: &Requester) -> Result<(), AppError> {
    if requester.can_write() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub(crate) fn require_administrator(requester: &Requester) -> Result<(), AppError> {
    if requester.is_administrator() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Query-string parameters of the index endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct IndexParams {
    pub page: Option<String>,
    pub items_per_page: Option<String>,
    pub order_by_model: Option<String>,
    pub order_by_attribute: Option<String>,
    pub order_by_direction: Option<String>,
}

/// An index listing: lenient ordering, optional pagination.
pub(crate) fn index_request(
    model: ModelName,
    params: &IndexParams,
    max_items_per_page: i64,
) -> Result<(SearchQuery, Option<Paginator>), AppError> {
    let order_by = match (&params.order_by_model, &params.order_by_attribute) {
        (Some(m), Some(a)) => {
            let expression = json!([m, a, params.order_by_direction.as_deref().unwrap_or("asc")]);
            OrderBy::lenient(model, Some(&expression))
        }
        _ => OrderBy::primary_key(),
    };
    let paginator = Paginator::from_params(
        params.page.as_deref(),
        params.items_per_page.as_deref(),
        max_items_per_page,
    )
    .map_err(AppError::Validation)?;

    Ok((SearchQuery::listing(model, order_by), paginator))
}

/// A search request body: `{"query": {"filter": ..., "order_by": ...},
/// "paginator": {...}}`.
pub(crate) fn search_request(
    model: ModelName,
    body: &Bytes,
    max_items_per_page: i64,
) -> Result<(SearchQuery, Option<Paginator>), AppError> {
    let body: Value = decode(body)?;

    let query = match body.get("query") {
        Some(query) => SearchQuery::compile(model, query),
        None => {
            let mut errors = QueryErrors::default();
            errors.mark_malformed();
            Err(errors)
        }
    };
    let paginator = Paginator::from_value(body.get("paginator"), max_items_per_page);

    match (query, paginator) {
        (Ok(query), Ok(paginator)) => Ok((query, paginator)),
        (query, paginator) => {
            let mut errors = query.err().map(QueryErrors::into_map).unwrap_or_default();
            if let Err(paginator_errors) = paginator {
                errors.extend(paginator_errors);
            }
            Err(AppError::Validation(errors))
        }
    }
}

/// Body of the `new_search` endpoints.
pub(crate) fn new_search_response(model: ModelName) -> Value {
    json!({ "search_parameters": search_parameters(model) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MALFORMED_KEY;

    #[test]
    fn test_search_request_without_query_is_malformed() {
        let body = Bytes::from_static(br#"{"paginator": {"page": 1, "items_per_page": 5}}"#);
        match search_request(ModelName::Form, &body, 100) {
            Err(AppError::Validation(errors)) => assert!(errors.contains_key(MALFORMED_KEY)),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_search_request_reports_query_and_paginator_errors_together() {
        let body = Bytes::from_static(
            br#"{"query": {"filter": ["Form", "nope", "=", 1]}, "paginator": {"page": 0, "items_per_page": 5}}"#,
        );
        match search_request(ModelName::Form, &body, 100) {
            Err(AppError::Validation(errors)) => {
                assert!(errors.contains_key("Form.nope"));
                assert!(errors.contains_key("page"));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_json_body() {
        let body = Bytes::from_static(b"{not json");
        match search_request(ModelName::Form, &body, 100) {
            Err(AppError::BadRequest(message)) => assert_eq!(message, JSON_DECODE_MESSAGE),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_index_request_falls_back_on_bad_order_by() {
        let params = IndexParams {
            order_by_model: Some("Form".into()),
            order_by_attribute: Some("nonexistent".into()),
            ..Default::default()
        };
        let (query, paginator) = index_request(ModelName::Form, &params, 100).unwrap();
        assert_eq!(query.order_by, OrderBy::primary_key());
        assert!(paginator.is_none());
    }
}
