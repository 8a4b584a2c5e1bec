//! Vault persistence.
//!
//! A vault is owned by exactly one user (personal) or exactly one
//! organization (shared) — the schema CHECK constraint enforces the
//! either/or. Exactly one vault per user carries `is_default`; the partial
//! unique index enforces that, and [`VaultStore::ensure_default`] creates it
//! idempotently on sync.

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

/// Who owns a vault — exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultOwner {
    User(String),
    Organization(String),
}

/// A vault row. The name is client-encrypted and opaque to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Owning user, for personal vaults.
    pub user_id: Option<String>,
    /// Owning organization, for shared vaults.
    pub organization_id: Option<String>,
    /// Client-encrypted vault name. Opaque.
    pub encrypted_name: String,
    /// Exactly one per user; auto-created on first sync.
    pub is_default: bool,
    /// Unix timestamp when the vault was created.
    pub created_at: i64,
    /// Unix timestamp when the vault was last updated.
    pub updated_at: i64,
}

fn row_to_vault(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vault> {
    Ok(Vault {
        id: row.get(0)?,
        user_id: row.get(1)?,
        organization_id: row.get(2)?,
        encrypted_name: row.get(3)?,
        is_default: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const VAULT_COLUMNS: &str =
    "id, user_id, organization_id, encrypted_name, is_default, created_at, updated_at";

// ═══════════════════════════════════════════════════════════════════════
//  VaultStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD operations on vaults.
#[derive(Clone)]
pub struct VaultStore {
    db: Database,
}

impl VaultStore {
    /// Create a new vault store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a vault for the given owner.
    #[instrument(skip(self, encrypted_name))]
    pub async fn create(
        &self,
        owner: VaultOwner,
        encrypted_name: &str,
        is_default: bool,
    ) -> StoreResult<Vault> {
        let (user_id, organization_id) = match owner {
            VaultOwner::User(id) => (Some(id), None),
            VaultOwner::Organization(id) => (None, Some(id)),
        };

        let vault = Vault {
            id: Uuid::now_v7().to_string(),
            user_id,
            organization_id,
            encrypted_name: encrypted_name.to_string(),
            is_default,
            created_at: Utc::now().timestamp(),
            updated_at: Utc::now().timestamp(),
        };

        let v = vault.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO vaults (id, user_id, organization_id, encrypted_name, \
                     is_default, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    rusqlite::params![
                        v.id,
                        v.user_id,
                        v.organization_id,
                        v.encrypted_name,
                        v.is_default,
                        v.created_at,
                    ],
                )
                .map_err(|e| {
                    if let rusqlite::Error::SqliteFailure(ref err, _) = e
                        && err.code == rusqlite::ErrorCode::ConstraintViolation
                    {
                        return StoreError::Conflict("default vault already exists".into());
                    }
                    StoreError::Sqlite(e)
                })?;
                Ok(())
            })
            .await?;

        debug!(vault_id = %vault.id, "vault created");
        Ok(vault)
    }

    /// Fetch a vault by id, returning `None` if absent.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Vault>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let v = conn
                    .query_row(
                        &format!("SELECT {VAULT_COLUMNS} FROM vaults WHERE id = ?1"),
                        rusqlite::params![id],
                        row_to_vault,
                    )
                    .optional()?;
                Ok(v)
            })
            .await
    }

    /// All personal vaults for a user.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Vault>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VAULT_COLUMNS} FROM vaults WHERE user_id = ?1 ORDER BY created_at"
                ))?;
                let vaults = stmt
                    .query_map(rusqlite::params![user_id], row_to_vault)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(vaults)
            })
            .await
    }

    /// All vaults belonging to any of the given organizations.
    pub async fn list_for_orgs(&self, org_ids: &[String]) -> StoreResult<Vec<Vault>> {
        if org_ids.is_empty() {
            return Ok(Vec::new());
        }
        let org_ids = org_ids.to_vec();
        self.db
            .execute(move |conn| {
                let placeholders = vec!["?"; org_ids.len()].join(",");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {VAULT_COLUMNS} FROM vaults WHERE organization_id IN ({placeholders}) \
                     ORDER BY created_at"
                ))?;
                let vaults = stmt
                    .query_map(rusqlite::params_from_iter(org_ids.iter()), row_to_vault)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(vaults)
            })
            .await
    }

    /// Count vaults owned by an organization (for the plan cap).
    pub async fn count_for_org(&self, org_id: &str) -> StoreResult<i64> {
        let org_id = org_id.to_string();
        self.db
            .execute(move |conn| {
                let c: i64 = conn.query_row(
                    "SELECT count(*) FROM vaults WHERE organization_id = ?1",
                    rusqlite::params![org_id],
                    |row| row.get(0),
                )?;
                Ok(c)
            })
            .await
    }

    /// Replace the client-encrypted name.
    #[instrument(skip(self, encrypted_name))]
    pub async fn update_name(&self, id: &str, encrypted_name: &str) -> StoreResult<()> {
        let id = id.to_string();
        let encrypted_name = encrypted_name.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE vaults SET encrypted_name = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, encrypted_name, now],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound { entity: "vault", id });
                }
                Ok(())
            })
            .await
    }

    /// Remove a vault and its items in one transaction.
    ///
    /// This is the vault-level purge: item-level deletion elsewhere is
    /// always a tombstone, but removing the whole container also removes its
    /// contents, and the vault's absence from the next sync communicates the
    /// deletion to other devices.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM vault_items WHERE vault_id = ?1",
                    rusqlite::params![id],
                )?;
                let changed = tx.execute("DELETE FROM vaults WHERE id = ?1", rusqlite::params![id])?;
                if changed == 0 {
                    return Err(StoreError::NotFound { entity: "vault", id });
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Idempotently ensure the user has a default vault.
    ///
    /// Returns the existing or newly created default. The insert-if-absent
    /// runs in one transaction so two concurrent syncs cannot both create
    /// one (the partial unique index backstops it regardless).
    #[instrument(skip(self))]
    pub async fn ensure_default(&self, user_id: &str) -> StoreResult<Vault> {
        let user_id = user_id.to_string();
        let candidate_id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let existing = tx
                    .query_row(
                        &format!(
                            "SELECT {VAULT_COLUMNS} FROM vaults \
                             WHERE user_id = ?1 AND is_default = 1"
                        ),
                        rusqlite::params![user_id],
                        row_to_vault,
                    )
                    .optional()?;

                if let Some(v) = existing {
                    return Ok(v);
                }

                // Empty encrypted name: the client re-encrypts a real name on
                // its next push if it wants one.
                tx.execute(
                    "INSERT INTO vaults (id, user_id, encrypted_name, is_default, created_at, \
                     updated_at) VALUES (?1, ?2, '', 1, ?3, ?3)",
                    rusqlite::params![candidate_id, user_id, now],
                )?;

                let v = tx.query_row(
                    &format!("SELECT {VAULT_COLUMNS} FROM vaults WHERE id = ?1"),
                    rusqlite::params![candidate_id],
                    row_to_vault,
                )?;
                tx.commit()?;
                debug!(vault_id = %v.id, "default vault created");
                Ok(v)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_store::UserStore;

    async fn setup() -> (VaultStore, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let users = UserStore::new(db.clone());
        let u = users.create("a@x.com", None, None).await.unwrap();
        (VaultStore::new(db), u.id)
    }

    #[tokio::test]
    async fn ensure_default_is_idempotent() {
        let (vaults, user_id) = setup().await;

        let first = vaults.ensure_default(&user_id).await.unwrap();
        let second = vaults.ensure_default(&user_id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_default);

        let all = vaults.list_for_user(&user_id).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn create_and_delete_personal_vault() {
        let (vaults, user_id) = setup().await;

        let v = vaults
            .create(VaultOwner::User(user_id.clone()), "enc-name", false)
            .await
            .unwrap();
        assert_eq!(vaults.list_for_user(&user_id).await.unwrap().len(), 1);

        vaults.delete(&v.id).await.unwrap();
        assert!(vaults.get(&v.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_name_on_missing_vault_is_not_found() {
        let (vaults, _) = setup().await;
        let err = vaults.update_name("nope", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
