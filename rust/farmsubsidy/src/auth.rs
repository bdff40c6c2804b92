//! Access tiers resolved from request headers.

use crate::config::AppConfig;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthTier {
    Anonymous,
    Authenticated,
}

impl AuthTier {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthTier::Authenticated)
    }

    /// Single-byte discriminator mixed into cache keys.
    pub fn flag(&self) -> u8 {
        match self {
            AuthTier::Anonymous => 0,
            AuthTier::Authenticated => 1,
        }
    }
}

/// A known bearer token authenticates the request. Missing or unknown
/// tokens fall back to anonymous access rather than failing.
pub fn resolve_tier(headers: &HeaderMap, config: &AppConfig) -> AuthTier {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(token) if config.api_tokens.iter().any(|known| known == token) => {
            AuthTier::Authenticated
        }
        _ => AuthTier::Anonymous,
    }
}

/// True when the request carries the configured api key, either as the
/// `api_key` parameter or the `x-api-key` header.
pub fn has_api_key(headers: &HeaderMap, param: Option<&str>, config: &AppConfig) -> bool {
    let Some(expected) = config.api_key.as_deref() else {
        return false;
    };
    let header = headers.get("x-api-key").and_then(|value| value.to_str().ok());
    param == Some(expected) || header == Some(expected)
}
