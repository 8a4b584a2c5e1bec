//! The public plan catalogue.
//!
//! No user session here: the endpoint is meant for pre-signup pricing pages
//! and is gated by a static `x-api-key` app-identity header instead.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use ring::constant_time::verify_slices_are_equal;
use serde::Serialize;
use zkvault_store::OrgPlan;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub plan: &'static str,
    pub max_members: i64,
    pub max_vaults: i64,
}

pub async fn plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PlanEntry>>> {
    // An unconfigured key disables the endpoint outright; an empty header
    // must never match an empty configuration.
    let configured = state.config.catalog_api_key.as_bytes();
    if configured.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if verify_slices_are_equal(presented.as_bytes(), configured).is_err() {
        return Err(ApiError::Unauthorized);
    }

    let entries = [OrgPlan::Free, OrgPlan::Team, OrgPlan::Enterprise]
        .into_iter()
        .map(|plan| {
            let (max_members, max_vaults) = plan.default_caps();
            PlanEntry {
                plan: plan.as_str(),
                max_members,
                max_vaults,
            }
        })
        .collect();
    Ok(Json(entries))
}
