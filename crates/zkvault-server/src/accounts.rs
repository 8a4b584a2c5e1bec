//! Account endpoints: resolution, registration, key initialization, hints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use zkvault_auth::{KeyInit, LoginMethod, resolve};
use zkvault_crypto::{KdfParams, KdfType};
use zkvault_store::User;

use crate::error::{ApiError, ApiResult};
use crate::extract::{AuthUser, RequestMeta};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /api/accounts/lookup
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LookupRequest {
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub exists: bool,
    pub login_method: LoginMethod,
    #[serde(rename = "requires2FA")]
    pub requires_2fa: bool,
    pub kdf_type: KdfType,
    pub kdf_iterations: u32,
    pub kdf_memory: u32,
    pub kdf_parallelism: u32,
}

/// Resolve how to log in with an email. Unauthenticated; answers the same
/// shape for unknown addresses, with the current default KDF parameters.
pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LookupRequest>,
) -> ApiResult<Json<LookupResponse>> {
    let lookup = resolve(&state.users, &req.email).await?;
    Ok(Json(LookupResponse {
        exists: lookup.method != LoginMethod::Register,
        login_method: lookup.method,
        requires_2fa: lookup.requires_two_factor,
        kdf_type: lookup.kdf.kdf_type,
        kdf_iterations: lookup.kdf.iterations,
        kdf_memory: lookup.kdf.memory_mib,
        kdf_parallelism: lookup.kdf.parallelism,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/accounts/register
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: i64,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

/// Create an unkeyed account with a server-hashed password.
pub async fn register(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ProfileResponse>)> {
    let user = state
        .accounts
        .register(
            &req.email,
            req.name.as_deref(),
            &req.password,
            &meta.into_auth_meta(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

// ---------------------------------------------------------------------------
// POST /api/accounts/keys
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysRequest {
    pub public_key: String,
    pub encrypted_private_key: String,
    pub protected_symmetric_key: String,
    pub master_password_hash: String,
    pub kdf_type: KdfType,
    pub kdf_iterations: u32,
    #[serde(default)]
    pub kdf_memory: u32,
    #[serde(default)]
    pub kdf_parallelism: u32,
}

/// Install the client-generated key hierarchy. Bearer-authenticated with an
/// interim password-login token; outstanding refresh tokens are revoked, so
/// the client must log in again with the master-password hash.
pub async fn init_keys(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<KeysRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    if req.public_key.is_empty()
        || req.encrypted_private_key.is_empty()
        || req.protected_symmetric_key.is_empty()
        || req.master_password_hash.is_empty()
    {
        return Err(ApiError::BadRequest("all key fields are required".into()));
    }

    let init = KeyInit {
        public_key: req.public_key,
        encrypted_private_key: req.encrypted_private_key,
        protected_symmetric_key: req.protected_symmetric_key,
        kdf: KdfParams {
            kdf_type: req.kdf_type,
            iterations: req.kdf_iterations,
            memory_mib: req.kdf_memory,
            parallelism: req.kdf_parallelism,
        },
        master_password_hash: req.master_password_hash,
    };
    let meta = auth.meta.clone().into_auth_meta();
    let user = state.accounts.init_keys(&auth.user.id, init, &meta).await?;
    Ok(Json(user.into()))
}

// ---------------------------------------------------------------------------
// POST /api/accounts/password-hint
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct HintRequest {
    pub email: String,
}

/// Always answers with a generic success so the endpoint cannot confirm
/// whether an account exists. Rate-limited per email.
pub async fn password_hint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HintRequest>,
) -> ApiResult<Json<Value>> {
    // The hint itself would be delivered out of band; it is intentionally
    // not part of the response body.
    let _ = state.accounts.password_hint(&req.email).await?;
    Ok(Json(json!({
        "message": "if the account exists, the password hint has been sent"
    })))
}

// ---------------------------------------------------------------------------
// PUT /api/accounts/password, PUT /api/accounts/password-hint
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Change the server-side password. Every refresh token is revoked and the
/// security stamp rotates, so all sessions end here.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let meta = auth.meta.clone().into_auth_meta();
    state
        .accounts
        .change_password(&auth.user.id, &req.current_password, &req.new_password, &meta)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SetHintRequest {
    pub hint: Option<String>,
}

/// Set or clear the caller's own password hint.
pub async fn set_password_hint(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<SetHintRequest>,
) -> ApiResult<StatusCode> {
    state.accounts.set_password_hint(&auth.user.id, req.hint).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST/DELETE /api/accounts/two-factor
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TwoFactorRequest {
    pub secret: String,
    pub code: String,
}

/// Enable TOTP. The caller proves possession of the secret by submitting one
/// valid code alongside it.
pub async fn enable_two_factor(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<TwoFactorRequest>,
) -> ApiResult<StatusCode> {
    state
        .accounts
        .enable_two_factor(&auth.user.id, &req.secret, &req.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disable_two_factor(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<StatusCode> {
    state.accounts.disable_two_factor(&auth.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
