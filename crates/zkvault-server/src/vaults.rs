//! Vault, item and sync endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use zkvault_store::{ItemCreate, ItemUpdate, PushResult, Vault, VaultItem, VaultOwner};
use zkvault_vault::{SyncRequest, SyncResponse};

use crate::error::{ApiError, ApiResult};
use crate::extract::AuthUser;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /api/sync
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQuery {
    pub since: Option<i64>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// Full sync when `since` is absent, delta otherwise. The response carries a
/// `serverTime` the client sends back as `since` next call.
pub async fn sync(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<SyncQuery>,
) -> ApiResult<Json<SyncResponse>> {
    let request = SyncRequest {
        since: query.since,
        include_deleted: query.include_deleted,
    };
    let response = state.sync.sync(&auth.caller(), &request).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// /api/vaults
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVaultRequest {
    pub encrypted_name: String,
    /// Present for org vaults, absent for personal ones.
    pub organization_id: Option<String>,
}

pub async fn list_vaults(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Vault>>> {
    Ok(Json(state.vaults.list_vaults(&auth.caller()).await?))
}

pub async fn create_vault(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateVaultRequest>,
) -> ApiResult<(StatusCode, Json<Vault>)> {
    let caller = auth.caller();
    let owner = match req.organization_id {
        Some(org_id) => VaultOwner::Organization(org_id),
        None => VaultOwner::User(caller.user_id.clone()),
    };
    let vault = state
        .vaults
        .create_vault(&caller, owner, &req.encrypted_name)
        .await?;
    Ok((StatusCode::CREATED, Json(vault)))
}

pub async fn get_vault(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vault>> {
    Ok(Json(state.vaults.get_vault(&auth.caller(), &id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVaultRequest {
    pub encrypted_name: String,
}

pub async fn update_vault(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateVaultRequest>,
) -> ApiResult<Json<Vault>> {
    Ok(Json(
        state
            .vaults
            .update_vault(&auth.caller(), &id, &req.encrypted_name)
            .await?,
    ))
}

pub async fn delete_vault(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.vaults.delete_vault(&auth.caller(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// /api/vaults/{id}/items, /api/items
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemsQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

/// List a vault's items outside a full sync.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(vault_id): Path<String>,
    Query(query): Query<ListItemsQuery>,
) -> ApiResult<Json<Vec<VaultItem>>> {
    let items = state
        .vaults
        .list_items(&auth.caller(), &vault_id, query.include_deleted)
        .await?;
    Ok(Json(items))
}

/// Single item create; sugar over a one-element push.
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(vault_id): Path<String>,
    Json(create): Json<ItemCreate>,
) -> ApiResult<(StatusCode, Json<VaultItem>)> {
    let mut result = state
        .vaults
        .push_items(&auth.caller(), &vault_id, vec![create], vec![], vec![])
        .await?;
    match (result.created.pop(), result.conflicts.pop()) {
        (Some(item), _) => Ok((StatusCode::CREATED, Json(item))),
        (None, Some(server_version)) => {
            Err(ApiError::Conflict(format!(
                "item {} has a newer revision on the server",
                server_version.id
            )))
        }
        (None, None) => Err(ApiError::Internal),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub vault_id: String,
    #[serde(default)]
    pub creates: Vec<ItemCreate>,
    #[serde(default)]
    pub updates: Vec<ItemUpdate>,
    #[serde(default)]
    pub deletes: Vec<String>,
}

/// Bulk push, applied in one transaction. Rejected updates come back in
/// `conflicts` with the server's version of each item.
pub async fn push_items(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<PushRequest>,
) -> ApiResult<Json<PushResult>> {
    let result = state
        .vaults
        .push_items(
            &auth.caller(),
            &req.vault_id,
            req.creates,
            req.updates,
            req.deletes,
        )
        .await?;
    Ok(Json(result))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.vaults.delete_item(&auth.caller(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
