//! Request authentication extractor.
//!
//! Verifies the bearer token, provisions scope rows lazily and caches the
//! resolved identity on the request extensions so one request never
//! resolves twice.

use arta_identity::ScopeResolver;
use arta_types::AuthenticatedUser;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::{AppState, StorageScope};

/// Extractor wrapper around the resolved identity.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

fn bearer_from(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(cached) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(AuthUser(cached.clone()));
        }

        let resolver = ScopeResolver::new(
            state.verifier.clone(),
            Some(StorageScope(state.storage.clone())),
        );
        let user = resolver.resolve(bearer_from(parts).as_deref()).await?;

        parts.extensions.insert(user.clone());
        Ok(AuthUser(user))
    }
}

/// Best-effort client address for rate-limit bucketing.
pub fn remote_addr(parts_headers: &axum::http::HeaderMap) -> String {
    parts_headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "local".to_string())
}
