//! Identity and scope resolution.
//!
//! Tokens are HMAC-SHA256-signed JSON claims:
//! `base64url(claims) ∥ "." ∥ base64url(HMAC-SHA256(secret, base64url(claims)))`.
//! Verification is constant time via the MAC's own comparison. A verified
//! token resolves into an [`AuthenticatedUser`] — lazily provisioning the
//! tenant and customer rows — exactly once per request; callers cache the
//! result on the request context.

#![deny(unsafe_code)]

use arta_types::{AuthenticatedUser, Customer, ErrorCode};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signed claim set carried by a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Customer external reference.
    pub sub: String,
    pub tenant_id: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Identity failures, split along the 401 taxonomy: `Required` for a missing
/// or unreadable credential, `Invalid` for one that fails verification.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("authentication required: {0}")]
    Required(String),

    #[error("authentication invalid: {0}")]
    Invalid(String),

    #[error("scope store error: {0}")]
    Store(String),
}

impl IdentityError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IdentityError::Required(_) => ErrorCode::AuthRequired,
            IdentityError::Invalid(_) => ErrorCode::AuthInvalid,
            IdentityError::Store(_) => ErrorCode::InternalError,
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// The subset of persistence the resolver needs: lazy tenant/customer
/// provisioning keyed by the token scope.
#[async_trait::async_trait]
pub trait ScopeStore: Send + Sync {
    /// Ensure a tenant row exists for the slug/id and return its id.
    async fn ensure_tenant(&self, tenant_id: &str) -> Result<String, String>;

    /// Ensure a customer row exists for `(tenant, external_reference)`.
    async fn ensure_customer(
        &self,
        tenant_id: &str,
        external_reference: &str,
    ) -> Result<Customer, String>;
}

/// Token minting and verification around a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never leaves this struct, not even in debug output.
        f.debug_struct("TokenVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Sign claims into a bearer token. Used by tests and local tooling.
    pub fn sign(&self, claims: &TokenClaims) -> IdentityResult<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| IdentityError::Store(format!("claims serialization: {e}")))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| IdentityError::Store("invalid HMAC key".to_string()))?;
        mac.update(payload_b64.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload_b64}.{signature}"))
    }

    /// Verify signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> IdentityResult<TokenClaims> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| IdentityError::Required("malformed token".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| IdentityError::Invalid("signature encoding".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| IdentityError::Store("invalid HMAC key".to_string()))?;
        mac.update(payload_b64.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature)
            .map_err(|_| IdentityError::Invalid("signature mismatch".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| IdentityError::Invalid("payload encoding".to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| IdentityError::Invalid("claims shape".to_string()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(IdentityError::Invalid("token expired".to_string()));
        }
        Ok(claims)
    }
}

/// Resolves verified claims into a request identity, provisioning scope rows
/// lazily when a store is configured.
pub struct ScopeResolver<S> {
    verifier: TokenVerifier,
    store: Option<S>,
}

impl<S: ScopeStore> ScopeResolver<S> {
    pub fn new(verifier: TokenVerifier, store: Option<S>) -> Self {
        Self { verifier, store }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Full resolution: verify the bearer token, then (with a store) ensure
    /// the tenant and customer exist and belong together.
    pub async fn resolve(&self, bearer: Option<&str>) -> IdentityResult<AuthenticatedUser> {
        let token =
            bearer.ok_or_else(|| IdentityError::Required("missing bearer token".to_string()))?;
        let claims = self.verifier.verify(token)?;

        let customer_id = match &self.store {
            Some(store) => {
                store
                    .ensure_tenant(&claims.tenant_id)
                    .await
                    .map_err(IdentityError::Store)?;
                let customer = store
                    .ensure_customer(&claims.tenant_id, &claims.sub)
                    .await
                    .map_err(IdentityError::Store)?;
                if customer.tenant_id != claims.tenant_id {
                    return Err(IdentityError::Invalid(
                        "customer does not belong to token tenant".to_string(),
                    ));
                }
                customer.id
            }
            // No store configured: trust the token's scope.
            None => claims.sub.clone(),
        };

        tracing::debug!(tenant_id = %claims.tenant_id, user_id = %claims.sub, "identity resolved");

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            customer_id,
            roles: claims.roles.unwrap_or_default(),
        })
    }
}
