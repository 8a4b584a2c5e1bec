//! Request extractors: bearer authentication and request metadata.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use tracing::debug;
use zkvault_auth::Claims;
use zkvault_store::User;
use zkvault_vault::Caller;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, established from the `Authorization` header.
///
/// Verifies the bearer token's signature and expiry, then loads the user and
/// rejects tokens whose security stamp no longer matches (password changed,
/// keys re-initialized). Disabled accounts are rejected the same way.
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
    pub meta: RequestMeta,
}

impl AuthUser {
    /// The caller context handed to the service layer.
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user.id.clone(),
            email: self.user.email.clone(),
            ip: self.meta.ip.clone(),
            user_agent: self.meta.user_agent.clone(),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let claims = state.tokens.verify(token).map_err(|_| ApiError::Unauthorized)?;

        let user = state
            .users
            .get(&claims.sub)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "user lookup failed during auth");
                ApiError::Internal
            })?
            .ok_or(ApiError::Unauthorized)?;

        if !user.enabled || user.security_stamp != claims.stamp {
            debug!(user_id = %user.id, "stale or disabled session rejected");
            return Err(ApiError::Unauthorized);
        }

        let meta = RequestMeta::from_parts(parts);
        Ok(AuthUser { user, claims, meta })
    }
}

/// Client metadata recorded in the audit log. Never fails to extract.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_parts(parts: &Parts) -> Self {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        Self { ip, user_agent }
    }

    pub fn into_auth_meta(self) -> zkvault_auth::RequestMeta {
        zkvault_auth::RequestMeta {
            ip: self.ip,
            user_agent: self.user_agent,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestMeta::from_parts(parts))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
