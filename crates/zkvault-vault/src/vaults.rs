//! Vault and item operations behind access control.
//!
//! Every operation takes the authenticated [`Caller`]; the service resolves
//! the caller's access to the target vault before touching it. A vault the
//! caller cannot see reports as `NotFound`, indistinguishable from one that
//! does not exist.

use tracing::{info, instrument};
use zkvault_store::{
    AuditStore, EventType, ItemCreate, ItemStore, ItemUpdate, NewAuditEntry, OrgStore, PushResult,
    Vault, VaultItem, VaultOwner, VaultStore,
};

use crate::access::{self, Caller};
use crate::error::{VaultError, VaultResult};

/// Vault and item operations over the stores.
#[derive(Clone)]
pub struct VaultService {
    vaults: VaultStore,
    items: ItemStore,
    orgs: OrgStore,
    audit: AuditStore,
}

impl VaultService {
    pub fn new(vaults: VaultStore, items: ItemStore, orgs: OrgStore, audit: AuditStore) -> Self {
        Self {
            vaults,
            items,
            orgs,
            audit,
        }
    }

    /// Create a vault. Personal vaults only for the caller themselves; org
    /// vaults require owner/admin and respect the org's vault cap.
    #[instrument(skip(self, caller, encrypted_name), fields(user_id = %caller.user_id))]
    pub async fn create_vault(
        &self,
        caller: &Caller,
        owner: VaultOwner,
        encrypted_name: &str,
    ) -> VaultResult<Vault> {
        let org_id = match &owner {
            VaultOwner::User(user_id) => {
                if *user_id != caller.user_id {
                    return Err(VaultError::Forbidden);
                }
                None
            }
            VaultOwner::Organization(org_id) => {
                access::require_admin(&self.orgs, org_id, &caller.user_id).await?;
                let org = self.orgs.get(org_id).await?.ok_or(VaultError::NotFound {
                    entity: "organization",
                    id: org_id.clone(),
                })?;
                if self.vaults.count_for_org(org_id).await? >= org.max_vaults {
                    return Err(VaultError::Conflict("organization vault limit reached".into()));
                }
                Some(org_id.clone())
            }
        };

        let vault = self.vaults.create(owner, encrypted_name, false).await?;
        self.audit(caller, org_id, EventType::VaultCreated, "vault", &vault.id)
            .await?;
        info!(vault_id = %vault.id, "vault created");
        Ok(vault)
    }

    /// All vaults the caller can read: their own plus every vault of an org
    /// they are a confirmed member of.
    pub async fn list_vaults(&self, caller: &Caller) -> VaultResult<Vec<Vault>> {
        let mut vaults = self.vaults.list_for_user(&caller.user_id).await?;
        let org_ids = self.confirmed_org_ids(caller).await?;
        vaults.extend(self.vaults.list_for_orgs(&org_ids).await?);
        Ok(vaults)
    }

    pub async fn get_vault(&self, caller: &Caller, vault_id: &str) -> VaultResult<Vault> {
        let vault = self.load(vault_id).await?;
        access::vault_access(&self.orgs, caller, &vault).await?;
        Ok(vault)
    }

    /// Replace the client-encrypted vault name.
    #[instrument(skip(self, caller, encrypted_name), fields(user_id = %caller.user_id))]
    pub async fn update_vault(
        &self,
        caller: &Caller,
        vault_id: &str,
        encrypted_name: &str,
    ) -> VaultResult<Vault> {
        let vault = self.writable(caller, vault_id).await?;
        self.vaults.update_name(vault_id, encrypted_name).await?;
        self.audit(
            caller,
            vault.organization_id.clone(),
            EventType::VaultUpdated,
            "vault",
            vault_id,
        )
        .await?;
        self.load(vault_id).await
    }

    /// Delete a vault and everything in it. The default personal vault is
    /// not deletable; it would be recreated on the next sync anyway.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn delete_vault(&self, caller: &Caller, vault_id: &str) -> VaultResult<()> {
        let vault = self.writable(caller, vault_id).await?;
        if vault.is_default {
            return Err(VaultError::Conflict("the default vault cannot be deleted".into()));
        }
        self.vaults.delete(vault_id).await?;
        self.audit(
            caller,
            vault.organization_id,
            EventType::VaultDeleted,
            "vault",
            vault_id,
        )
        .await?;
        info!(vault_id, "vault deleted");
        Ok(())
    }

    /// List a vault's items.
    pub async fn list_items(
        &self,
        caller: &Caller,
        vault_id: &str,
        include_deleted: bool,
    ) -> VaultResult<Vec<VaultItem>> {
        let vault = self.load(vault_id).await?;
        access::vault_access(&self.orgs, caller, &vault).await?;
        Ok(self.items.list_by_vault(vault_id, include_deleted).await?)
    }

    /// Apply a batch of creates, updates and deletes in one transaction.
    ///
    /// Rejected updates come back in `conflicts` carrying the server's
    /// version of the item; those rows are untouched.
    #[instrument(skip_all, fields(user_id = %caller.user_id, vault_id))]
    pub async fn push_items(
        &self,
        caller: &Caller,
        vault_id: &str,
        creates: Vec<ItemCreate>,
        updates: Vec<ItemUpdate>,
        deletes: Vec<String>,
    ) -> VaultResult<PushResult> {
        let vault = self.writable(caller, vault_id).await?;
        let result = self.items.push(vault_id, creates, updates, deletes).await?;

        self.audit_with_metadata(
            caller,
            vault.organization_id,
            EventType::ItemPush,
            "vault",
            vault_id,
            serde_json::json!({
                "created": result.created.len(),
                "updated": result.updated.len(),
                "deleted": result.deleted.len(),
                "conflicts": result.conflicts.len(),
            }),
        )
        .await?;
        Ok(result)
    }

    /// Tombstone a single item.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn delete_item(&self, caller: &Caller, item_id: &str) -> VaultResult<()> {
        let Some(item) = self.items.get(item_id).await? else {
            return Err(VaultError::NotFound {
                entity: "vault item",
                id: item_id.to_string(),
            });
        };
        let vault = self.writable(caller, &item.vault_id).await?;
        self.items.soft_delete(item_id).await?;
        self.audit(
            caller,
            vault.organization_id,
            EventType::ItemDeleted,
            "vault_item",
            item_id,
        )
        .await?;
        Ok(())
    }

    // ── internals ──

    pub(crate) async fn confirmed_org_ids(&self, caller: &Caller) -> VaultResult<Vec<String>> {
        let memberships = self.orgs.memberships_for_user(&caller.user_id).await?;
        Ok(memberships
            .into_iter()
            .filter(|m| m.status == zkvault_store::MembershipStatus::Confirmed)
            .map(|m| m.organization_id)
            .collect())
    }

    async fn load(&self, vault_id: &str) -> VaultResult<Vault> {
        self.vaults
            .get(vault_id)
            .await?
            .ok_or_else(|| VaultError::NotFound {
                entity: "vault",
                id: vault_id.to_string(),
            })
    }

    async fn writable(&self, caller: &Caller, vault_id: &str) -> VaultResult<Vault> {
        let vault = self.load(vault_id).await?;
        let grant = access::vault_access(&self.orgs, caller, &vault).await?;
        if !grant.can_write() {
            return Err(VaultError::Forbidden);
        }
        Ok(vault)
    }

    async fn audit(
        &self,
        caller: &Caller,
        organization_id: Option<String>,
        event: EventType,
        target_type: &'static str,
        target_id: &str,
    ) -> VaultResult<()> {
        self.audit_with_metadata(
            caller,
            organization_id,
            event,
            target_type,
            target_id,
            serde_json::Value::Null,
        )
        .await
    }

    async fn audit_with_metadata(
        &self,
        caller: &Caller,
        organization_id: Option<String>,
        event: EventType,
        target_type: &'static str,
        target_id: &str,
        metadata: serde_json::Value,
    ) -> VaultResult<()> {
        self.audit
            .append(NewAuditEntry {
                actor_user_id: caller.user_id.clone(),
                organization_id,
                event_type: event,
                target_type,
                target_id: Some(target_id.to_string()),
                ip: caller.ip.clone(),
                user_agent: caller.user_agent.clone(),
                metadata,
            })
            .await?;
        Ok(())
    }
}
