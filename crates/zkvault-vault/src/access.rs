//! Caller context and vault access checks.

use zkvault_store::{MembershipStatus, OrgMembership, OrgStore, Vault};

use crate::error::{VaultError, VaultResult};

/// The authenticated caller, as established by the token layer, plus the
/// request metadata recorded in the audit log.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub email: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            ip: None,
            user_agent: None,
        }
    }
}

/// What a caller may do with a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultAccess {
    /// Personal vault owner, or org owner/admin.
    ReadWrite,
    /// Confirmed org member without an admin role.
    ReadOnly,
}

impl VaultAccess {
    pub fn can_write(self) -> bool {
        matches!(self, VaultAccess::ReadWrite)
    }
}

/// Resolve the caller's access to a vault.
///
/// Personal vaults belong to exactly one user. Org vaults are readable by
/// any confirmed member and writable by owner/admin. No access at all
/// reports the vault as absent.
pub(crate) async fn vault_access(
    orgs: &OrgStore,
    caller: &Caller,
    vault: &Vault,
) -> VaultResult<VaultAccess> {
    if let Some(user_id) = &vault.user_id {
        if *user_id == caller.user_id {
            return Ok(VaultAccess::ReadWrite);
        }
        return Err(not_found(vault));
    }

    let Some(org_id) = &vault.organization_id else {
        // A vault row has exactly one owner; the schema enforces it.
        return Err(not_found(vault));
    };
    let Some(membership) = confirmed_membership(orgs, org_id, &caller.user_id).await? else {
        return Err(not_found(vault));
    };

    if membership.role.is_admin() {
        Ok(VaultAccess::ReadWrite)
    } else {
        Ok(VaultAccess::ReadOnly)
    }
}

/// The caller's confirmed membership in an org, if any.
pub(crate) async fn confirmed_membership(
    orgs: &OrgStore,
    org_id: &str,
    user_id: &str,
) -> VaultResult<Option<OrgMembership>> {
    let membership = orgs.find_membership(org_id, user_id).await?;
    Ok(membership.filter(|m| m.status == MembershipStatus::Confirmed))
}

/// Require a confirmed owner/admin membership in an org.
pub(crate) async fn require_admin(
    orgs: &OrgStore,
    org_id: &str,
    user_id: &str,
) -> VaultResult<OrgMembership> {
    let Some(membership) = confirmed_membership(orgs, org_id, user_id).await? else {
        return Err(VaultError::NotFound {
            entity: "organization",
            id: org_id.to_string(),
        });
    };
    if !membership.role.is_admin() {
        return Err(VaultError::Forbidden);
    }
    Ok(membership)
}

fn not_found(vault: &Vault) -> VaultError {
    VaultError::NotFound {
        entity: "vault",
        id: vault.id.clone(),
    }
}
