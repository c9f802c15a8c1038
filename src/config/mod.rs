//! Configuration module for the fieldwork backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default and ceiling for `items_per_page`.
pub const DEFAULT_MAX_ITEMS_PER_PAGE: i64 = 1000;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Secret for the administrator created on first start
    pub admin_key: Option<String>,
    /// Largest page a client may request
    pub max_items_per_page: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("FIELDDB_DB_PATH")
            .unwrap_or_else(|_| "./data/fielddb.sqlite".to_string())
            .into();

        let bind_addr = env::var("FIELDDB_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid FIELDDB_BIND_ADDR format");

        let log_level = env::var("FIELDDB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("FIELDDB_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let admin_key = env::var("FIELDDB_ADMIN_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let max_items_per_page = env::var("FIELDDB_MAX_ITEMS_PER_PAGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &i64| *n >= 1)
            .unwrap_or(DEFAULT_MAX_ITEMS_PER_PAGE);

        Self {
            db_path,
            bind_addr,
            log_level,
            log_json,
            admin_key,
            max_items_per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("FIELDDB_DB_PATH");
        env::remove_var("FIELDDB_BIND_ADDR");
        env::remove_var("FIELDDB_LOG_LEVEL");
        env::remove_var("FIELDDB_LOG_FORMAT");
        env::remove_var("FIELDDB_ADMIN_KEY");
        env::remove_var("FIELDDB_MAX_ITEMS_PER_PAGE");

        let config = Config::from_env();

        assert_eq!(config.db_path, PathBuf::from("./data/fielddb.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert!(config.admin_key.is_none());
        assert_eq!(config.max_items_per_page, DEFAULT_MAX_ITEMS_PER_PAGE);
    }
}
