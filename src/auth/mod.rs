//! API key authentication.
//!
//! Keys have the form `<user_id>.<secret>`. Only the SHA-256 digest of the
//! secret is stored; digests are compared in constant time. On success the request carries a
//! [`Requester`] extension for the handlers.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::access::Requester;
use crate::errors::AppError;
use crate::AppState;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication layer resolving the API key to a user.
pub async fn api_key_auth_layer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
        .map(|s| s.trim().to_string());

    let Some(key) = provided else {
        return unauthorized("Missing API key");
    };

    match authenticate(&state, &key).await {
        Ok(Some(requester)) => {
            request.extensions_mut().insert(requester);
            next.run(request).await
        }
        Ok(None) => unauthorized("Invalid API key"),
        Err(e) => e.into_response(),
    }
}

/// Resolve an API key to the requesting user, with the current access settings.
async fn authenticate(state: &AppState, key: &str) -> Result<Option<Requester>, AppError> {
    let Some((user_id, secret)) = split_key(key) else {
        return Ok(None);
    };
    let Some((user, expected)) = state.repo.get_user_credentials(user_id).await? else {
        return Ok(None);
    };
    if !constant_time_compare(&hash_secret(secret), &expected) {
        tracing::warn!("Rejected API key for user {}", user_id);
        return Ok(None);
    }

    let settings = state.repo.access_settings().await?;
    Ok(Some(Requester::new(user, &settings)))
}

/// SHA-256 hex digest of an API secret, as stored in the users table.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split `<user_id>.<secret>`.
fn split_key(key: &str) -> Option<(i64, &str)> {
    let (id, secret) = key.split_once('.')?;
    let id = id.parse().ok()?;
    (!secret.is_empty()).then_some((id, secret))
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Constant-time comparison
    a_bytes.ct_eq(b_bytes).into()
}

fn unauthorized(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    #[test]
    fn test_constant_time_compare_empty() {
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("", "not-empty"));
    }

    #[test]
    fn test_hash_secret_is_stable_hex_digest() {
        let digest = hash_secret("hunter2-secret");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hash_secret("hunter2-secret"));
        assert_ne!(digest, hash_secret("hunter3-secret"));
        assert_eq!(
            hash_secret(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("12.abc.def"), Some((12, "abc.def")));
        assert_eq!(split_key("12."), None);
        assert_eq!(split_key("x.abc"), None);
        assert_eq!(split_key("abc"), None);
    }
}
