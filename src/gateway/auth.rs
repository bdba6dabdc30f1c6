//! Request authentication.
//!
//! JWT verification itself is an external collaborator; the gateway only
//! needs a verified `{user_id, tenant_id}` pair. The tenant falls back
//! to the user id when the token carries no tenant claim (single-tenant
//! mode).

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use super::error::ApiError;

/// A verified caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    /// Acting user.
    pub user_id: Uuid,
    /// Tenant the call is scoped to.
    pub tenant_id: Uuid,
}

/// Token verification seam.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verifies a bearer token into a caller context.
    async fn verify(&self, token: &str) -> Result<AuthContext, ApiError>;
}

/// Extracts the bearer token and verifies it.
pub async fn authenticate(
    headers: &HeaderMap,
    verifier: &dyn AuthVerifier,
) -> Result<AuthContext, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Auth("missing bearer token".to_string()))?;

    verifier.verify(token).await
}

/// Verifier backed by the auth endpoint of the relational platform.
pub struct RestAuthVerifier {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
}

impl RestAuthVerifier {
    /// Creates a verifier for the platform at `base_url`.
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }
}

#[async_trait]
impl AuthVerifier for RestAuthVerifier {
    async fn verify(&self, token: &str) -> Result<AuthContext, ApiError> {
        let response = self
            .http
            .get(&self.auth_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("auth endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::Auth("invalid token".to_string()));
        }

        let user: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("bad auth response: {e}")))?;

        let user_id = user
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ApiError::Auth("token carries no user id".to_string()))?;

        let tenant_id = user
            .get("app_metadata")
            .and_then(|m| m.get("tenant_id"))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or(user_id);

        Ok(AuthContext { user_id, tenant_id })
    }
}

/// Fixed-identity verifier for tests.
#[cfg(any(test, feature = "mock"))]
pub struct MockAuthVerifier {
    context: AuthContext,
}

#[cfg(any(test, feature = "mock"))]
impl MockAuthVerifier {
    /// Accepts every non-empty token as `context`.
    pub fn new(context: AuthContext) -> Self {
        Self { context }
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl AuthVerifier for MockAuthVerifier {
    async fn verify(&self, token: &str) -> Result<AuthContext, ApiError> {
        if token == "invalid" {
            return Err(ApiError::Auth("invalid token".to_string()));
        }
        Ok(self.context)
    }
}
