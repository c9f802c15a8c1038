//! Global application settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSettings {
    pub object_language_name: String,
    /// Users allowed to see restricted records.
    pub unrestricted_users: Vec<i64>,
    pub datetime_modified: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsInput {
    pub object_language_name: String,
    pub unrestricted_users: Vec<i64>,
}
