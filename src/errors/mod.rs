//! Error handling module for the fieldwork backend.
//!
//! Provides a central error type with mapping to HTTP status codes and the two
//! error envelopes: `{"error": msg}` and `{"errors": {key: msg}}`.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::access::UNAUTHORIZED_MESSAGE;
use crate::query::QueryErrors;

/// Error codes used when logging.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

pub const JSON_DECODE_MESSAGE: &str =
    "JSON decode error: the parameters provided were not valid JSON.";
pub const DATABASE_MESSAGE: &str = "Invalid database query";
pub const NOT_NEW_MESSAGE: &str =
    "The update request failed because the submitted data were not new.";

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication required
    Unauthorized(String),
    /// Authenticated, but not allowed; the reason is never disclosed
    Forbidden,
    /// Resource not found
    NotFound(String),
    /// Single top-level client error
    BadRequest(String),
    /// Per-field validation or search errors
    Validation(BTreeMap<String, String>),
    /// Unanticipated database failure; details are logged, not returned
    Database(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Forbidden => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the client-facing message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Forbidden => UNAUTHORIZED_MESSAGE.to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Validation(errors) => errors
                .iter()
                .map(|(key, msg)| format!("{}: {}", key, msg))
                .collect::<Vec<_>>()
                .join("; "),
            AppError::Database(_) => DATABASE_MESSAGE.to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Single-field validation error.
    pub fn field(key: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(key.to_string(), message.into());
        AppError::Validation(errors)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("Stored JSON could not be processed: {:?}", err);
        AppError::Internal(err.to_string())
    }
}

impl From<QueryErrors> for AppError {
    fn from(errors: QueryErrors) -> Self {
        AppError::Validation(errors.into_map())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        let body = match self {
            AppError::Validation(errors) => json!({ "errors": errors }),
            other => json!({ "error": other.message() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Database("constraint".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_database_details_are_not_exposed() {
        let err = AppError::Database("UNIQUE constraint failed: tags.name".into());
        assert_eq!(err.message(), DATABASE_MESSAGE);
    }

    #[test]
    fn test_query_errors_convert_to_field_map() {
        let mut errors = QueryErrors::default();
        errors.add("Form.nope", "Searching on Form.nope is not permitted");
        errors.mark_malformed();
        match AppError::from(errors) {
            AppError::Validation(map) => {
                assert_eq!(map.len(), 2);
                assert!(map.contains_key(crate::query::MALFORMED_KEY));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
