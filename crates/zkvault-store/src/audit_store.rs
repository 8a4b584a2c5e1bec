//! Append-only audit log.
//!
//! One entry per security-relevant action. The richer internal causes that
//! are collapsed at the external boundary (absent vs. inaccessible, expired
//! vs. unknown token) stay available here and in logs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// Audit event types. String-encoded in storage so the log stays readable
/// with plain SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Register,
    Login,
    LoginFailed,
    KeyInit,
    TokenRefresh,
    Logout,
    PasswordChanged,
    VaultCreated,
    VaultUpdated,
    VaultDeleted,
    ItemPush,
    ItemDeleted,
    SyncFull,
    SyncDelta,
    OrgCreated,
    MemberInvited,
    MemberAccepted,
    MemberConfirmed,
    MemberRoleChanged,
    MemberRevoked,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::LoginFailed => "login_failed",
            Self::KeyInit => "key_init",
            Self::TokenRefresh => "token_refresh",
            Self::Logout => "logout",
            Self::PasswordChanged => "password_changed",
            Self::VaultCreated => "vault_created",
            Self::VaultUpdated => "vault_updated",
            Self::VaultDeleted => "vault_deleted",
            Self::ItemPush => "item_push",
            Self::ItemDeleted => "item_deleted",
            Self::SyncFull => "sync_full",
            Self::SyncDelta => "sync_delta",
            Self::OrgCreated => "org_created",
            Self::MemberInvited => "member_invited",
            Self::MemberAccepted => "member_accepted",
            Self::MemberConfirmed => "member_confirmed",
            Self::MemberRoleChanged => "member_role_changed",
            Self::MemberRevoked => "member_revoked",
        }
    }
}

/// A stored audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub actor_user_id: String,
    pub organization_id: Option<String>,
    pub event_type: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Arbitrary JSON metadata (counts, prior values, ...).
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// A new entry to append.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_user_id: String,
    pub organization_id: Option<String>,
    pub event_type: EventType,
    pub target_type: &'static str,
    pub target_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let metadata: String = row.get(8)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        actor_user_id: row.get(1)?,
        organization_id: row.get(2)?,
        event_type: row.get(3)?,
        target_type: row.get(4)?,
        target_id: row.get(5)?,
        ip: row.get(6)?,
        user_agent: row.get(7)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: row.get(9)?,
    })
}

const AUDIT_COLUMNS: &str = "id, actor_user_id, organization_id, event_type, target_type, \
     target_id, ip, user_agent, metadata, created_at";

/// Maximum rows per audit page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Append and query operations on the audit log.
#[derive(Clone)]
pub struct AuditStore {
    db: Database,
}

impl AuditStore {
    /// Create a new audit store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one entry. Never updates or deletes.
    #[instrument(skip(self, entry), fields(event = entry.event_type.as_str()))]
    pub async fn append(&self, entry: NewAuditEntry) -> StoreResult<()> {
        let now = Utc::now().timestamp();
        let metadata = serde_json::to_string(&entry.metadata)?;
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO audit_log (actor_user_id, organization_id, event_type, \
                     target_type, target_id, ip, user_agent, metadata, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        entry.actor_user_id,
                        entry.organization_id,
                        entry.event_type.as_str(),
                        entry.target_type,
                        entry.target_id,
                        entry.ip,
                        entry.user_agent,
                        metadata,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Paginated entries for one organization, newest first.
    pub async fn list_for_org(
        &self,
        org_id: &str,
        page: i64,
        per_page: i64,
    ) -> StoreResult<Vec<AuditEntry>> {
        let org_id = org_id.to_string();
        let (limit, offset) = page_bounds(page, per_page)?;
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE organization_id = ?1 \
                     ORDER BY id DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![org_id, limit, offset], row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Paginated entries where the user is the actor, newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        page: i64,
        per_page: i64,
    ) -> StoreResult<Vec<AuditEntry>> {
        let user_id = user_id.to_string();
        let (limit, offset) = page_bounds(page, per_page)?;
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE actor_user_id = ?1 \
                     ORDER BY id DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id, limit, offset], row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }
}

fn page_bounds(page: i64, per_page: i64) -> StoreResult<(i64, i64)> {
    if page < 1 {
        return Err(StoreError::InvalidArgument("page starts at 1".into()));
    }
    let limit = per_page.clamp(1, MAX_PAGE_SIZE);
    Ok((limit, (page - 1) * limit))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> AuditStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        AuditStore::new(db)
    }

    fn entry(event: EventType, org: Option<&str>) -> NewAuditEntry {
        NewAuditEntry {
            actor_user_id: "u1".into(),
            organization_id: org.map(|s| s.to_string()),
            event_type: event,
            target_type: "vault",
            target_id: Some("v1".into()),
            ip: Some("198.51.100.7".into()),
            user_agent: Some("zkvault-cli".into()),
            metadata: serde_json::json!({"items": 3}),
        }
    }

    #[tokio::test]
    async fn append_and_page() {
        let audit = store().await;
        for _ in 0..5 {
            audit.append(entry(EventType::ItemPush, Some("o1"))).await.unwrap();
        }

        let page1 = audit.list_for_org("o1", 1, 2).await.unwrap();
        let page2 = audit.list_for_org("o1", 2, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert!(page1[0].id > page2[0].id);
    }

    #[tokio::test]
    async fn user_scope_sees_own_entries_only() {
        let audit = store().await;
        audit.append(entry(EventType::Login, None)).await.unwrap();
        let mut other = entry(EventType::Login, None);
        other.actor_user_id = "u2".into();
        audit.append(other).await.unwrap();

        let mine = audit.list_for_user("u1", 1, 50).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].actor_user_id, "u1");
    }

    #[tokio::test]
    async fn page_size_is_capped() {
        let audit = store().await;
        audit.append(entry(EventType::Login, None)).await.unwrap();
        // Oversized per_page must not error, just clamp.
        let rows = audit.list_for_user("u1", 1, 10_000).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
