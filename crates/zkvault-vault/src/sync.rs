//! The sync engine: one operation that hands a client everything it needs.
//!
//! Full sync (no `since`) returns the complete picture; delta sync returns
//! only items changed at or after the client's last server timestamp, with
//! tombstones always included so deletions propagate. Vaults are cheap and
//! few, so both modes return them in full; a vault missing from the list is
//! how clients learn it was deleted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use zkvault_store::{
    AuditStore, Device, DeviceStore, EventType, ItemStore, NewAuditEntry, OrgMembership, OrgStore,
    User, UserStore, Vault, VaultItem, VaultStore,
};

use crate::access::Caller;
use crate::error::{VaultError, VaultResult};

/// Sync parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    /// Server timestamp from the previous sync; absent means full sync.
    pub since: Option<i64>,
    /// Full sync only: also return tombstoned items.
    pub include_deleted: bool,
}

/// The caller's profile as returned by sync. Server-side credential hashes
/// and the TOTP secret never leave the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProfile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub public_key: Option<String>,
    pub encrypted_private_key: Option<String>,
    pub protected_symmetric_key: Option<String>,
    pub security_stamp: String,
}

impl From<User> for SyncProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            public_key: user.public_key,
            encrypted_private_key: user.encrypted_private_key,
            protected_symmetric_key: user.protected_symmetric_key,
            security_stamp: user.security_stamp,
        }
    }
}

/// Everything a client needs to rebuild local state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub profile: SyncProfile,
    /// The caller's memberships, wrapped org key included where confirmed.
    pub memberships: Vec<OrgMembership>,
    /// Always the complete accessible set, full and delta alike.
    pub vaults: Vec<Vault>,
    pub items: Vec<VaultItem>,
    pub devices: Vec<Device>,
    /// Timestamp the client persists and sends as `since` next time.
    pub server_time: i64,
}

/// Assembles sync responses across the stores.
#[derive(Clone)]
pub struct SyncEngine {
    users: UserStore,
    vaults: VaultStore,
    items: ItemStore,
    orgs: OrgStore,
    devices: DeviceStore,
    audit: AuditStore,
}

impl SyncEngine {
    pub fn new(
        users: UserStore,
        vaults: VaultStore,
        items: ItemStore,
        orgs: OrgStore,
        devices: DeviceStore,
        audit: AuditStore,
    ) -> Self {
        Self {
            users,
            vaults,
            items,
            orgs,
            devices,
            audit,
        }
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn sync(&self, caller: &Caller, request: &SyncRequest) -> VaultResult<SyncResponse> {
        // Capture the timestamp before reading so a write racing this sync
        // is re-sent by the next delta rather than lost.
        let server_time = Utc::now().timestamp();

        let Some(user) = self.users.get(&caller.user_id).await? else {
            return Err(VaultError::NotFound {
                entity: "user",
                id: caller.user_id.clone(),
            });
        };

        self.vaults.ensure_default(&user.id).await?;

        let memberships = self.orgs.memberships_for_user(&user.id).await?;
        let org_ids: Vec<String> = memberships
            .iter()
            .filter(|m| m.status == zkvault_store::MembershipStatus::Confirmed)
            .map(|m| m.organization_id.clone())
            .collect();

        let mut vaults = self.vaults.list_for_user(&user.id).await?;
        vaults.extend(self.vaults.list_for_orgs(&org_ids).await?);

        let items = match request.since {
            Some(since) => {
                let vault_ids: Vec<String> = vaults.iter().map(|v| v.id.clone()).collect();
                self.items.list_changed(&vault_ids, since).await?
            }
            None => {
                let mut all = Vec::new();
                for vault in &vaults {
                    all.extend(
                        self.items
                            .list_by_vault(&vault.id, request.include_deleted)
                            .await?,
                    );
                }
                all
            }
        };

        let devices = self.devices.list_for_user(&user.id).await?;

        let mode = if request.since.is_some() {
            EventType::SyncDelta
        } else {
            EventType::SyncFull
        };
        self.audit
            .append(NewAuditEntry {
                actor_user_id: user.id.clone(),
                organization_id: None,
                event_type: mode,
                target_type: "sync",
                target_id: None,
                ip: caller.ip.clone(),
                user_agent: caller.user_agent.clone(),
                metadata: serde_json::json!({
                    "vaults": vaults.len(),
                    "items": items.len(),
                }),
            })
            .await?;

        debug!(
            vaults = vaults.len(),
            items = items.len(),
            delta = request.since.is_some(),
            "sync assembled"
        );
        Ok(SyncResponse {
            profile: user.into(),
            memberships,
            vaults,
            items,
            devices,
            server_time,
        })
    }
}
