//! Saved form searches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UserMini;

/// A named form query, stored so it can be run again later.
#[derive(Debug, Clone, Serialize)]
pub struct FormSearch {
    pub id: i64,
    pub name: String,
    /// The `query` member of a form search request.
    pub search: Value,
    pub description: String,
    pub enterer: Option<UserMini>,
    pub datetime_modified: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormSearchInput {
    pub name: String,
    pub search: Value,
    pub description: String,
}
