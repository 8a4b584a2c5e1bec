//! Organization and membership persistence.
//!
//! Each membership carries the shared organization symmetric key wrapped
//! under that member's public key (`encrypted_org_key`). The key is stored
//! only while the membership is active: revocation clears it. The role
//! hierarchy and state machine rules are enforced by the organization
//! service; this module owns rows and uniqueness.

use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Subscription tier; determines member and vault caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgPlan {
    Free,
    Team,
    Enterprise,
}

impl OrgPlan {
    /// Default `(max_members, max_vaults)` for the tier.
    pub fn default_caps(self) -> (i64, i64) {
        match self {
            Self::Free => (2, 2),
            Self::Team => (25, 50),
            Self::Enterprise => (1_000, 1_000),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "free" => Ok(Self::Free),
            "team" => Ok(Self::Team),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(StoreError::InvalidArgument(format!("unknown plan: {other}"))),
        }
    }
}

/// Membership role. `Owner` is immutable through the role-update path and
/// unique per organization (enforced by a partial unique index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Owner,
    Admin,
    Member,
    Readonly,
}

impl OrgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Readonly => "readonly",
        }
    }

    pub fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "readonly" => Ok(Self::Readonly),
            other => Err(StoreError::InvalidArgument(format!("unknown role: {other}"))),
        }
    }

    /// True for roles allowed to administer the organization.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// Membership lifecycle: `invited → accepted → confirmed`, or `→ revoked`
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Invited,
    Accepted,
    Confirmed,
    Revoked,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invited => "invited",
            Self::Accepted => "accepted",
            Self::Confirmed => "confirmed",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "invited" => Ok(Self::Invited),
            "accepted" => Ok(Self::Accepted),
            "confirmed" => Ok(Self::Confirmed),
            "revoked" => Ok(Self::Revoked),
            other => Err(StoreError::InvalidArgument(format!("unknown status: {other}"))),
        }
    }
}

/// An organization row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub billing_email: String,
    pub plan: OrgPlan,
    pub max_members: i64,
    pub max_vaults: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A membership row. `user_id` is `None` until the invited account accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgMembership {
    pub id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub invited_email: String,
    pub role: OrgRole,
    pub status: MembershipStatus,
    /// Org symmetric key wrapped under this member's public key. Cleared on
    /// revocation, populated at confirmation.
    pub encrypted_org_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn row_to_org(row: &rusqlite::Row<'_>) -> rusqlite::Result<Organization> {
    let plan: String = row.get(3)?;
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        billing_email: row.get(2)?,
        plan: OrgPlan::parse(&plan).unwrap_or(OrgPlan::Free),
        max_members: row.get(4)?,
        max_vaults: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_membership(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrgMembership> {
    let role: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(OrgMembership {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        user_id: row.get(2)?,
        invited_email: row.get(3)?,
        role: OrgRole::parse(&role).unwrap_or(OrgRole::Readonly),
        status: MembershipStatus::parse(&status).unwrap_or(MembershipStatus::Revoked),
        encrypted_org_key: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const ORG_COLUMNS: &str =
    "id, name, billing_email, plan, max_members, max_vaults, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str = "id, organization_id, user_id, invited_email, role, status, \
     encrypted_org_key, created_at, updated_at";

// ═══════════════════════════════════════════════════════════════════════
//  OrgStore
// ═══════════════════════════════════════════════════════════════════════

/// Organization and membership row operations.
#[derive(Clone)]
pub struct OrgStore {
    db: Database,
}

impl OrgStore {
    /// Create a new organization store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an organization together with its owner membership, in one
    /// transaction. The creator supplies the org key wrapped to their own
    /// public key; the owner is `confirmed` from the start.
    #[instrument(skip(self, encrypted_org_key))]
    pub async fn create(
        &self,
        name: &str,
        billing_email: &str,
        plan: OrgPlan,
        owner_user_id: &str,
        owner_email: &str,
        encrypted_org_key: &str,
    ) -> StoreResult<(Organization, OrgMembership)> {
        let (max_members, max_vaults) = plan.default_caps();
        let now = Utc::now().timestamp();

        let org = Organization {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            billing_email: billing_email.to_string(),
            plan,
            max_members,
            max_vaults,
            created_at: now,
            updated_at: now,
        };
        let membership = OrgMembership {
            id: Uuid::now_v7().to_string(),
            organization_id: org.id.clone(),
            user_id: Some(owner_user_id.to_string()),
            invited_email: owner_email.to_string(),
            role: OrgRole::Owner,
            status: MembershipStatus::Confirmed,
            encrypted_org_key: Some(encrypted_org_key.to_string()),
            created_at: now,
            updated_at: now,
        };

        let (o, m) = (org.clone(), membership.clone());
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO organizations (id, name, billing_email, plan, max_members, \
                     max_vaults, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    rusqlite::params![
                        o.id,
                        o.name,
                        o.billing_email,
                        o.plan.as_str(),
                        o.max_members,
                        o.max_vaults,
                        o.created_at,
                    ],
                )?;
                tx.execute(
                    "INSERT INTO org_memberships (id, organization_id, user_id, invited_email, \
                     role, status, encrypted_org_key, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, 'owner', 'confirmed', ?5, ?6, ?6)",
                    rusqlite::params![
                        m.id,
                        m.organization_id,
                        m.user_id,
                        m.invited_email,
                        m.encrypted_org_key,
                        m.created_at,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!(org_id = %org.id, "organization created");
        Ok((org, membership))
    }

    /// Fetch an organization by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Organization>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let org = conn
                    .query_row(
                        &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"),
                        rusqlite::params![id],
                        row_to_org,
                    )
                    .optional()?;
                Ok(org)
            })
            .await
    }

    /// Fetch a membership by id.
    pub async fn get_membership(&self, id: &str) -> StoreResult<Option<OrgMembership>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let m = conn
                    .query_row(
                        &format!("SELECT {MEMBERSHIP_COLUMNS} FROM org_memberships WHERE id = ?1"),
                        rusqlite::params![id],
                        row_to_membership,
                    )
                    .optional()?;
                Ok(m)
            })
            .await
    }

    /// The caller's membership in one organization, if any non-revoked row
    /// exists.
    pub async fn find_membership(
        &self,
        org_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<OrgMembership>> {
        let org_id = org_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let m = conn
                    .query_row(
                        &format!(
                            "SELECT {MEMBERSHIP_COLUMNS} FROM org_memberships \
                             WHERE organization_id = ?1 AND user_id = ?2 AND status != 'revoked'"
                        ),
                        rusqlite::params![org_id, user_id],
                        row_to_membership,
                    )
                    .optional()?;
                Ok(m)
            })
            .await
    }

    /// All non-revoked memberships for a user (any status).
    pub async fn memberships_for_user(&self, user_id: &str) -> StoreResult<Vec<OrgMembership>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMBERSHIP_COLUMNS} FROM org_memberships \
                     WHERE user_id = ?1 AND status != 'revoked' ORDER BY created_at"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id], row_to_membership)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Pending invitations addressed to an email (not yet bound to a user).
    pub async fn invitations_for_email(&self, email: &str) -> StoreResult<Vec<OrgMembership>> {
        let email = email.trim().to_lowercase();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMBERSHIP_COLUMNS} FROM org_memberships \
                     WHERE invited_email = ?1 AND status = 'invited' ORDER BY created_at"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![email], row_to_membership)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// All memberships of an organization, every status included.
    pub async fn memberships_for_org(&self, org_id: &str) -> StoreResult<Vec<OrgMembership>> {
        let org_id = org_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMBERSHIP_COLUMNS} FROM org_memberships \
                     WHERE organization_id = ?1 ORDER BY created_at"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![org_id], row_to_membership)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Count non-revoked memberships (for the member cap).
    pub async fn count_active_members(&self, org_id: &str) -> StoreResult<i64> {
        let org_id = org_id.to_string();
        self.db
            .execute(move |conn| {
                let c: i64 = conn.query_row(
                    "SELECT count(*) FROM org_memberships \
                     WHERE organization_id = ?1 AND status != 'revoked'",
                    rusqlite::params![org_id],
                    |row| row.get(0),
                )?;
                Ok(c)
            })
            .await
    }

    /// Insert an invitation row.
    #[instrument(skip(self))]
    pub async fn insert_invitation(
        &self,
        org_id: &str,
        invited_email: &str,
        user_id: Option<&str>,
        role: OrgRole,
    ) -> StoreResult<OrgMembership> {
        let now = Utc::now().timestamp();
        let membership = OrgMembership {
            id: Uuid::now_v7().to_string(),
            organization_id: org_id.to_string(),
            user_id: user_id.map(|s| s.to_string()),
            invited_email: invited_email.trim().to_lowercase(),
            role,
            status: MembershipStatus::Invited,
            encrypted_org_key: None,
            created_at: now,
            updated_at: now,
        };

        let m = membership.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO org_memberships (id, organization_id, user_id, invited_email, \
                     role, status, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 'invited', ?6, ?6)",
                    rusqlite::params![
                        m.id,
                        m.organization_id,
                        m.user_id,
                        m.invited_email,
                        m.role.as_str(),
                        m.created_at,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(membership)
    }

    /// Bind a user to their invitation and mark it accepted.
    pub async fn mark_accepted(&self, membership_id: &str, user_id: &str) -> StoreResult<()> {
        let membership_id = membership_id.to_string();
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE org_memberships SET user_id = ?2, status = 'accepted', \
                     updated_at = ?3 WHERE id = ?1 AND status = 'invited'",
                    rusqlite::params![membership_id, user_id, now],
                )?;
                if changed == 0 {
                    return Err(StoreError::Conflict("membership is not in invited state".into()));
                }
                Ok(())
            })
            .await
    }

    /// Store the wrapped org key and mark the membership confirmed.
    pub async fn mark_confirmed(
        &self,
        membership_id: &str,
        encrypted_org_key: &str,
    ) -> StoreResult<()> {
        let membership_id = membership_id.to_string();
        let encrypted_org_key = encrypted_org_key.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE org_memberships SET status = 'confirmed', encrypted_org_key = ?2, \
                     updated_at = ?3 WHERE id = ?1 AND status = 'accepted'",
                    rusqlite::params![membership_id, encrypted_org_key, now],
                )?;
                if changed == 0 {
                    return Err(StoreError::Conflict("membership is not in accepted state".into()));
                }
                Ok(())
            })
            .await
    }

    /// Change a membership's role. State-machine and hierarchy rules are the
    /// organization service's responsibility.
    pub async fn set_role(&self, membership_id: &str, role: OrgRole) -> StoreResult<()> {
        let membership_id = membership_id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE org_memberships SET role = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![membership_id, role.as_str(), now],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound {
                        entity: "membership",
                        id: membership_id,
                    });
                }
                Ok(())
            })
            .await
    }

    /// Soft-revoke a membership, clearing the stored wrapped org key.
    ///
    /// The key is cleared, not retained: from this point the member's
    /// devices can no longer fetch material to decrypt organization data
    /// (pre-revocation copies are a documented gap absent key rotation).
    pub async fn mark_revoked(&self, membership_id: &str) -> StoreResult<()> {
        let membership_id = membership_id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE org_memberships SET status = 'revoked', encrypted_org_key = NULL, \
                     updated_at = ?2 WHERE id = ?1 AND status != 'revoked'",
                    rusqlite::params![membership_id, now],
                )?;
                if changed == 0 {
                    return Err(StoreError::Conflict("membership already revoked".into()));
                }
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
