//! Organization key-sharing: membership lifecycle and role management.
//!
//! The membership state machine is `invited → accepted → confirmed`, with
//! `revoked` reachable from any non-terminal state. The org's symmetric key
//! only ever exists wrapped: the creator wraps it to their own public key at
//! creation, and an owner/admin wraps it to each member's public key at
//! confirmation. The server stores and returns the wrapped blobs, nothing
//! else.

use tracing::{info, instrument, warn};
use zkvault_store::{
    AuditStore, EventType, MembershipStatus, NewAuditEntry, OrgMembership, OrgPlan, OrgRole,
    OrgStore, Organization, UserStore, VaultOwner, VaultStore,
};

use crate::access::{self, Caller};
use crate::error::{VaultError, VaultResult};

/// Organization and membership operations over the stores.
#[derive(Clone)]
pub struct OrgService {
    orgs: OrgStore,
    users: UserStore,
    vaults: VaultStore,
    audit: AuditStore,
}

impl OrgService {
    pub fn new(orgs: OrgStore, users: UserStore, vaults: VaultStore, audit: AuditStore) -> Self {
        Self {
            orgs,
            users,
            vaults,
            audit,
        }
    }

    /// Create an organization. The caller becomes its owner with a confirmed
    /// membership; `encrypted_org_key` is the org key wrapped to the
    /// caller's own public key. A first org vault is created alongside.
    #[instrument(skip(self, caller, encrypted_org_key), fields(user_id = %caller.user_id))]
    pub async fn create(
        &self,
        caller: &Caller,
        name: &str,
        billing_email: &str,
        plan: OrgPlan,
        encrypted_org_key: &str,
    ) -> VaultResult<(Organization, OrgMembership)> {
        if name.trim().is_empty() {
            return Err(VaultError::InvalidRequest("organization name required".into()));
        }
        let Some(user) = self.users.get(&caller.user_id).await? else {
            return Err(VaultError::NotFound {
                entity: "user",
                id: caller.user_id.clone(),
            });
        };
        if !user.keyed() {
            // Without a public key nobody could ever be confirmed into it.
            return Err(VaultError::Conflict(
                "account keys must be initialized before creating an organization".into(),
            ));
        }

        let (org, membership) = self
            .orgs
            .create(
                name,
                billing_email,
                plan,
                &user.id,
                &user.email,
                encrypted_org_key,
            )
            .await?;
        self.vaults
            .create(VaultOwner::Organization(org.id.clone()), "", false)
            .await?;

        self.audit(caller, &org.id, EventType::OrgCreated, "organization", &org.id)
            .await?;
        info!(org_id = %org.id, "organization created");
        Ok((org, membership))
    }

    /// Organizations the caller holds a confirmed membership in.
    pub async fn list_for_caller(&self, caller: &Caller) -> VaultResult<Vec<Organization>> {
        let memberships = self.orgs.memberships_for_user(&caller.user_id).await?;
        let mut organizations = Vec::new();
        for membership in memberships
            .iter()
            .filter(|m| m.status == MembershipStatus::Confirmed)
        {
            if let Some(org) = self.orgs.get(&membership.organization_id).await? {
                organizations.push(org);
            }
        }
        Ok(organizations)
    }

    pub async fn get(&self, caller: &Caller, org_id: &str) -> VaultResult<Organization> {
        if access::confirmed_membership(&self.orgs, org_id, &caller.user_id)
            .await?
            .is_none()
        {
            return Err(self.org_not_found(org_id));
        }
        self.orgs
            .get(org_id)
            .await?
            .ok_or_else(|| self.org_not_found(org_id))
    }

    /// Memberships of an org, visible to any confirmed member.
    pub async fn list_members(
        &self,
        caller: &Caller,
        org_id: &str,
    ) -> VaultResult<Vec<OrgMembership>> {
        if access::confirmed_membership(&self.orgs, org_id, &caller.user_id)
            .await?
            .is_none()
        {
            return Err(self.org_not_found(org_id));
        }
        Ok(self.orgs.memberships_for_org(org_id).await?)
    }

    /// Pending invitations addressed to the caller's email.
    pub async fn list_invitations(&self, caller: &Caller) -> VaultResult<Vec<OrgMembership>> {
        Ok(self.orgs.invitations_for_email(&caller.email).await?)
    }

    /// Invite an email into the org.
    ///
    /// Owner/admin only. The owner role cannot be granted; an admin may only
    /// grant member/readonly. Re-inviting an address with any non-revoked
    /// membership is a conflict, as is exceeding the member cap.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn invite(
        &self,
        caller: &Caller,
        org_id: &str,
        email: &str,
        role: OrgRole,
    ) -> VaultResult<OrgMembership> {
        let actor = access::require_admin(&self.orgs, org_id, &caller.user_id).await?;
        if role == OrgRole::Owner {
            return Err(VaultError::InvalidRequest("the owner role cannot be granted".into()));
        }
        if role == OrgRole::Admin && actor.role != OrgRole::Owner {
            return Err(VaultError::Forbidden);
        }

        let org = self.orgs.get(org_id).await?.ok_or_else(|| self.org_not_found(org_id))?;
        if self.orgs.count_active_members(org_id).await? >= org.max_members {
            return Err(VaultError::Conflict("organization member limit reached".into()));
        }

        let email = email.trim().to_lowercase();
        let existing = self.orgs.memberships_for_org(org_id).await?;
        if existing
            .iter()
            .any(|m| m.invited_email == email && m.status != MembershipStatus::Revoked)
        {
            return Err(VaultError::Conflict("already a member or invited".into()));
        }

        // Bind the invitation to the account up front when one exists.
        let user = self.users.find_by_email(&email).await?;
        let membership = self
            .orgs
            .insert_invitation(org_id, &email, user.as_ref().map(|u| u.id.as_str()), role)
            .await?;

        self.audit(caller, org_id, EventType::MemberInvited, "membership", &membership.id)
            .await?;
        info!(org_id, membership_id = %membership.id, "member invited");
        Ok(membership)
    }

    /// Accept an invitation addressed to the caller's email.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn accept(&self, caller: &Caller, membership_id: &str) -> VaultResult<OrgMembership> {
        let membership = self.load_membership(membership_id).await?;
        if membership.invited_email != caller.email.trim().to_lowercase() {
            return Err(self.membership_not_found(membership_id));
        }
        if membership.status != MembershipStatus::Invited {
            return Err(VaultError::Conflict(format!(
                "membership is {}, not invited",
                membership.status.as_str()
            )));
        }

        let Some(user) = self.users.get(&caller.user_id).await? else {
            return Err(VaultError::NotFound {
                entity: "user",
                id: caller.user_id.clone(),
            });
        };
        if !user.keyed() {
            return Err(VaultError::Conflict(
                "account keys must be initialized before joining an organization".into(),
            ));
        }

        self.orgs.mark_accepted(membership_id, &user.id).await?;
        self.audit(
            caller,
            &membership.organization_id,
            EventType::MemberAccepted,
            "membership",
            membership_id,
        )
        .await?;
        self.load_membership(membership_id).await
    }

    /// Confirm an accepted member into the org.
    ///
    /// Performed by an owner/admin who wraps the org key to the member's
    /// public key and submits the wrapped blob; the server never sees the
    /// key itself. `accepted → confirmed`.
    #[instrument(skip(self, caller, encrypted_org_key), fields(user_id = %caller.user_id))]
    pub async fn confirm(
        &self,
        caller: &Caller,
        membership_id: &str,
        encrypted_org_key: &str,
    ) -> VaultResult<OrgMembership> {
        let membership = self.load_membership(membership_id).await?;
        access::require_admin(&self.orgs, &membership.organization_id, &caller.user_id).await?;
        if membership.status != MembershipStatus::Accepted {
            return Err(VaultError::Conflict(format!(
                "membership is {}, not accepted",
                membership.status.as_str()
            )));
        }
        if encrypted_org_key.is_empty() {
            return Err(VaultError::InvalidRequest("wrapped organization key required".into()));
        }

        self.orgs.mark_confirmed(membership_id, encrypted_org_key).await?;
        self.audit(
            caller,
            &membership.organization_id,
            EventType::MemberConfirmed,
            "membership",
            membership_id,
        )
        .await?;
        info!(membership_id, "member confirmed");
        self.load_membership(membership_id).await
    }

    /// Change a member's role.
    ///
    /// The owner role is immutable in both directions. The owner may set any
    /// other role; an admin may only move members between member/readonly.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn set_role(
        &self,
        caller: &Caller,
        membership_id: &str,
        role: OrgRole,
    ) -> VaultResult<OrgMembership> {
        let membership = self.load_membership(membership_id).await?;
        let actor =
            access::require_admin(&self.orgs, &membership.organization_id, &caller.user_id).await?;

        if membership.role == OrgRole::Owner || role == OrgRole::Owner {
            return Err(VaultError::InvalidRequest("the owner role is immutable".into()));
        }
        if actor.role != OrgRole::Owner
            && (role == OrgRole::Admin || membership.role == OrgRole::Admin)
        {
            return Err(VaultError::Forbidden);
        }

        self.orgs.set_role(membership_id, role).await?;
        self.audit(
            caller,
            &membership.organization_id,
            EventType::MemberRoleChanged,
            "membership",
            membership_id,
        )
        .await?;
        self.load_membership(membership_id).await
    }

    /// Revoke a membership and clear the stored wrapped key.
    ///
    /// The owner cannot be revoked. The wrapped key is removed from the
    /// server, but a revoked member may still hold a previously fetched
    /// copy; full protection requires rotating the org key, which is a
    /// client-driven re-wrap this service does not perform.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn revoke(&self, caller: &Caller, membership_id: &str) -> VaultResult<()> {
        let membership = self.load_membership(membership_id).await?;
        let actor =
            access::require_admin(&self.orgs, &membership.organization_id, &caller.user_id).await?;

        if membership.role == OrgRole::Owner {
            return Err(VaultError::InvalidRequest("the owner cannot be revoked".into()));
        }
        if membership.role == OrgRole::Admin && actor.role != OrgRole::Owner {
            return Err(VaultError::Forbidden);
        }

        self.orgs.mark_revoked(membership_id).await?;
        warn!(
            membership_id,
            org_id = %membership.organization_id,
            "member revoked; org key not rotated"
        );
        self.audit(
            caller,
            &membership.organization_id,
            EventType::MemberRevoked,
            "membership",
            membership_id,
        )
        .await?;
        Ok(())
    }

    // ── internals ──

    async fn load_membership(&self, membership_id: &str) -> VaultResult<OrgMembership> {
        self.orgs
            .get_membership(membership_id)
            .await?
            .ok_or_else(|| self.membership_not_found(membership_id))
    }

    fn org_not_found(&self, org_id: &str) -> VaultError {
        VaultError::NotFound {
            entity: "organization",
            id: org_id.to_string(),
        }
    }

    fn membership_not_found(&self, membership_id: &str) -> VaultError {
        VaultError::NotFound {
            entity: "membership",
            id: membership_id.to_string(),
        }
    }

    async fn audit(
        &self,
        caller: &Caller,
        org_id: &str,
        event: EventType,
        target_type: &'static str,
        target_id: &str,
    ) -> VaultResult<()> {
        self.audit
            .append(NewAuditEntry {
                actor_user_id: caller.user_id.clone(),
                organization_id: Some(org_id.to_string()),
                event_type: event,
                target_type,
                target_id: Some(target_id.to_string()),
                ip: caller.ip.clone(),
                user_agent: caller.user_agent.clone(),
                metadata: serde_json::Value::Null,
            })
            .await?;
        Ok(())
    }
}
