//! Authentication endpoints: login, token refresh, logout.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zkvault_auth::{DeviceInfo, LoginOutcome, TokenPair};
use zkvault_store::User;

use crate::error::{ApiError, ApiResult};
use crate::extract::{AuthUser, RequestMeta};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/auth/login
// ---------------------------------------------------------------------------

/// One endpoint, two grants: `masterPasswordHash` for keyed accounts,
/// `password` for accounts that have not initialized keys yet.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: Option<String>,
    pub master_password_hash: Option<String>,
    pub two_factor_code: Option<String>,
    pub device: Option<DeviceInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(rename = "requires2FA")]
    pub requires_2fa: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected_symmetric_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl LoginResponse {
    fn success(user: &User, tokens: TokenPair) -> Self {
        Self {
            requires_2fa: false,
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            expires_in: Some(tokens.expires_in),
            token_type: Some("Bearer"),
            protected_symmetric_key: user.protected_symmetric_key.clone(),
            encrypted_private_key: user.encrypted_private_key.clone(),
            public_key: user.public_key.clone(),
        }
    }

    fn two_factor_challenge() -> Self {
        Self {
            requires_2fa: true,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            token_type: None,
            protected_symmetric_key: None,
            encrypted_private_key: None,
            public_key: None,
        }
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let auth_meta = meta.into_auth_meta();
    let outcome = match (&req.master_password_hash, &req.password) {
        (Some(mph), None) => {
            state
                .accounts
                .login_zk(
                    &req.email,
                    mph,
                    req.two_factor_code.as_deref(),
                    req.device.as_ref(),
                    &auth_meta,
                )
                .await?
        }
        (None, Some(password)) => {
            state
                .accounts
                .login_password(
                    &req.email,
                    password,
                    req.two_factor_code.as_deref(),
                    req.device.as_ref(),
                    &auth_meta,
                )
                .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of password or masterPasswordHash is required".into(),
            ));
        }
    };

    match outcome {
        LoginOutcome::Success { user, tokens } => Ok(Json(LoginResponse::success(&user, tokens))),
        LoginOutcome::TwoFactorRequired => {
            debug!("login pending second factor");
            Ok(Json(LoginResponse::two_factor_challenge()))
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/auth/refresh
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
}

/// Rotate a refresh token. The presented token is consumed whether or not
/// the caller keeps the response; replaying it fails.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let pair = state
        .accounts
        .refresh(&req.refresh_token, &meta.into_auth_meta())
        .await?;
    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        token_type: "Bearer",
    }))
}

// ---------------------------------------------------------------------------
// POST /api/auth/logout
// ---------------------------------------------------------------------------

/// Revoke every refresh token for the caller, all devices.
pub async fn logout(State(state): State<Arc<AppState>>, auth: AuthUser) -> ApiResult<StatusCode> {
    let meta = auth.meta.clone().into_auth_meta();
    state.accounts.logout(&auth.user.id, &meta).await?;
    Ok(StatusCode::NO_CONTENT)
}
