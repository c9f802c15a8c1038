//! Users and their roles.

use serde::{Deserialize, Serialize};

use super::UserMini;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Contributor,
    Viewer,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "administrator" => Some(Role::Administrator),
            "contributor" => Some(Role::Contributor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Contributor => "contributor",
            Role::Viewer => "viewer",
        }
    }
}

/// A user account. The API secret is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub affiliation: String,
    pub role: Role,
    pub datetime_modified: String,
}

impl User {
    pub fn mini(&self) -> UserMini {
        UserMini {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role.as_str().to_string(),
        }
    }
}

/// Request body for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub role: String,
}

/// A freshly created user together with the only copy of its API key.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    #[serde(flatten)]
    pub user: User,
    pub api_key: String,
}
