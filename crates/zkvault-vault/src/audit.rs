//! Audit log queries behind access control.

use zkvault_store::{AuditEntry, AuditStore, OrgStore};

use crate::access::{self, Caller};
use crate::error::VaultResult;

/// Paginated audit queries. Writes happen inline in the services that own
/// the audited operations; this is the read side.
#[derive(Clone)]
pub struct AuditQueries {
    audit: AuditStore,
    orgs: OrgStore,
}

impl AuditQueries {
    pub fn new(audit: AuditStore, orgs: OrgStore) -> Self {
        Self { audit, orgs }
    }

    /// Entries where the caller is the actor.
    pub async fn for_self(
        &self,
        caller: &Caller,
        page: i64,
        per_page: i64,
    ) -> VaultResult<Vec<AuditEntry>> {
        Ok(self.audit.list_for_user(&caller.user_id, page, per_page).await?)
    }

    /// Entries scoped to an organization. Owner/admin only.
    pub async fn for_org(
        &self,
        caller: &Caller,
        org_id: &str,
        page: i64,
        per_page: i64,
    ) -> VaultResult<Vec<AuditEntry>> {
        access::require_admin(&self.orgs, org_id, &caller.user_id).await?;
        Ok(self.audit.list_for_org(org_id, page, per_page).await?)
    }
}
