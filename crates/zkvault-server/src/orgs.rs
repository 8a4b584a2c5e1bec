//! Organization and membership endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use zkvault_store::{AuditEntry, OrgMembership, OrgPlan, OrgRole, Organization};

use crate::error::{ApiError, ApiResult};
use crate::extract::AuthUser;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// /api/organizations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrgRequest {
    pub name: String,
    pub billing_email: String,
    pub plan: String,
    /// Org key wrapped to the creator's own public key.
    pub encrypted_org_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrgResponse {
    pub organization: Organization,
    pub membership: OrgMembership,
}

pub async fn create_org(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateOrgRequest>,
) -> ApiResult<(StatusCode, Json<CreateOrgResponse>)> {
    let plan = OrgPlan::parse(&req.plan)
        .map_err(|_| ApiError::BadRequest(format!("unknown plan: {}", req.plan)))?;
    let (organization, membership) = state
        .orgs
        .create(
            &auth.caller(),
            &req.name,
            &req.billing_email,
            plan,
            &req.encrypted_org_key,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrgResponse {
            organization,
            membership,
        }),
    ))
}

/// Organizations the caller is a confirmed member of.
pub async fn list_orgs(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Organization>>> {
    Ok(Json(state.orgs.list_for_caller(&auth.caller()).await?))
}

pub async fn get_org(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Organization>> {
    Ok(Json(state.orgs.get(&auth.caller(), &id).await?))
}

/// The caller's memberships across all organizations, invitations included.
pub async fn list_memberships(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<OrgMembership>>> {
    Ok(Json(state.orgs.list_invitations(&auth.caller()).await?))
}

// ---------------------------------------------------------------------------
// /api/organizations/{id}/members
// ---------------------------------------------------------------------------

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(org_id): Path<String>,
) -> ApiResult<Json<Vec<OrgMembership>>> {
    Ok(Json(state.orgs.list_members(&auth.caller(), &org_id).await?))
}

#[derive(Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: String,
}

pub async fn invite_member(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(org_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<OrgMembership>)> {
    let role = parse_role(&req.role)?;
    let membership = state
        .orgs
        .invite(&auth.caller(), &org_id, &req.email, role)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

pub async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((_org_id, membership_id)): Path<(String, String)>,
) -> ApiResult<Json<OrgMembership>> {
    Ok(Json(state.orgs.accept(&auth.caller(), &membership_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Org key wrapped to the member's public key by the confirming admin.
    pub encrypted_org_key: String,
}

pub async fn confirm_member(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((_org_id, membership_id)): Path<(String, String)>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<OrgMembership>> {
    Ok(Json(
        state
            .orgs
            .confirm(&auth.caller(), &membership_id, &req.encrypted_org_key)
            .await?,
    ))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((_org_id, membership_id)): Path<(String, String)>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<OrgMembership>> {
    let role = parse_role(&req.role)?;
    Ok(Json(
        state.orgs.set_role(&auth.caller(), &membership_id, role).await?,
    ))
}

pub async fn revoke_member(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((_org_id, membership_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.orgs.revoke(&auth.caller(), &membership_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/audit, GET /api/organizations/{id}/audit
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

/// The caller's own audit trail.
pub async fn self_audit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(
        state
            .audit
            .for_self(&auth.caller(), query.page, query.per_page)
            .await?,
    ))
}

/// An organization's audit trail. Owner/admin only.
pub async fn org_audit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(org_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(
        state
            .audit
            .for_org(&auth.caller(), &org_id, query.page, query.per_page)
            .await?,
    ))
}

fn parse_role(s: &str) -> Result<OrgRole, ApiError> {
    OrgRole::parse(s).map_err(|_| ApiError::BadRequest(format!("unknown role: {s}")))
}
