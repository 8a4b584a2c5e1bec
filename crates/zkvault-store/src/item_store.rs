//! Vault item persistence and the bulk push transaction.
//!
//! Item payloads are opaque ciphertext: `encrypted_data` is carried as an
//! uninterpreted string end to end and nothing in this module (or anywhere
//! server-side) parses it. `revision_date` is a client-assigned logical
//! clock and the sole conflict arbiter; `updated_at` is the server write
//! time used by delta sync. User-requested deletion is always a tombstone
//! write so other devices learn of it on their next sync.

use chrono::Utc;
use rusqlite::{OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A vault item row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultItem {
    /// Client-generated identifier.
    pub id: String,
    /// The vault this item belongs to.
    pub vault_id: String,
    /// Opaque client-encrypted payload (type, name, credentials, ...).
    pub encrypted_data: String,
    /// Client-assigned logical clock; never decreases across accepted updates.
    pub revision_date: i64,
    /// Tombstone marker: `None` = live, `Some` = deleted at that time.
    pub deleted_at: Option<i64>,
    /// Unix timestamp when the item was first stored.
    pub created_at: i64,
    /// Server write time of the last accepted mutation.
    pub updated_at: i64,
}

/// A create entry in a bulk push. Identifiers are client-generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreate {
    pub id: String,
    pub encrypted_data: String,
    pub revision_date: i64,
}

/// An update entry in a bulk push.
///
/// `last_known_revision_date` is the value the client last synced; the
/// update is applied only when it matches the stored value and the new
/// `revision_date` does not go backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub id: String,
    pub encrypted_data: String,
    pub last_known_revision_date: i64,
    pub revision_date: i64,
}

/// Outcome of a bulk push. `conflicts` holds the server's authoritative
/// version of every item whose update was rejected; those rows were not
/// mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub created: Vec<VaultItem>,
    pub updated: Vec<VaultItem>,
    pub deleted: Vec<String>,
    pub conflicts: Vec<VaultItem>,
}

const ITEM_COLUMNS: &str =
    "id, vault_id, encrypted_data, revision_date, deleted_at, created_at, updated_at";

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<VaultItem> {
    Ok(VaultItem {
        id: row.get(0)?,
        vault_id: row.get(1)?,
        encrypted_data: row.get(2)?,
        revision_date: row.get(3)?,
        deleted_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn get_in_tx(tx: &Transaction<'_>, vault_id: &str, id: &str) -> StoreResult<Option<VaultItem>> {
    let item = tx
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM vault_items WHERE id = ?1 AND vault_id = ?2"),
            rusqlite::params![id, vault_id],
            row_to_item,
        )
        .optional()?;
    Ok(item)
}

// ═══════════════════════════════════════════════════════════════════════
//  ItemStore
// ═══════════════════════════════════════════════════════════════════════

/// Vault item operations. All multi-row mutations go through [`ItemStore::push`],
/// which applies the whole batch in a single transaction.
#[derive(Clone)]
pub struct ItemStore {
    db: Database,
}

impl ItemStore {
    /// Create a new item store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch an item by id, returning `None` if absent.
    pub async fn get(&self, id: &str) -> StoreResult<Option<VaultItem>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let item = conn
                    .query_row(
                        &format!("SELECT {ITEM_COLUMNS} FROM vault_items WHERE id = ?1"),
                        rusqlite::params![id],
                        row_to_item,
                    )
                    .optional()?;
                Ok(item)
            })
            .await
    }

    /// All items in a vault, optionally including tombstones.
    pub async fn list_by_vault(
        &self,
        vault_id: &str,
        include_deleted: bool,
    ) -> StoreResult<Vec<VaultItem>> {
        let vault_id = vault_id.to_string();
        self.db
            .execute(move |conn| {
                let sql = if include_deleted {
                    format!(
                        "SELECT {ITEM_COLUMNS} FROM vault_items WHERE vault_id = ?1 ORDER BY id"
                    )
                } else {
                    format!(
                        "SELECT {ITEM_COLUMNS} FROM vault_items \
                         WHERE vault_id = ?1 AND deleted_at IS NULL ORDER BY id"
                    )
                };
                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map(rusqlite::params![vault_id], row_to_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }

    /// Items changed since `since` across the given vaults.
    ///
    /// An item qualifies when either its server write time or its client
    /// revision clock is `>= since`; tombstones are always included so
    /// deletions propagate.
    pub async fn list_changed(
        &self,
        vault_ids: &[String],
        since: i64,
    ) -> StoreResult<Vec<VaultItem>> {
        if vault_ids.is_empty() {
            return Ok(Vec::new());
        }
        let vault_ids = vault_ids.to_vec();
        self.db
            .execute(move |conn| {
                let placeholders = vec!["?"; vault_ids.len()].join(",");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM vault_items \
                     WHERE vault_id IN ({placeholders}) \
                       AND (updated_at >= ? OR revision_date >= ?) \
                     ORDER BY id"
                ))?;
                let params: Vec<Box<dyn rusqlite::types::ToSql>> = vault_ids
                    .iter()
                    .map(|v| Box::new(v.clone()) as Box<dyn rusqlite::types::ToSql>)
                    .chain([
                        Box::new(since) as Box<dyn rusqlite::types::ToSql>,
                        Box::new(since) as Box<dyn rusqlite::types::ToSql>,
                    ])
                    .collect();
                let items = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), row_to_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }

    /// Apply a bulk push of creates, updates and deletes to one vault.
    ///
    /// The whole batch runs in a single transaction: a partial failure can
    /// never leave the vault half-migrated for a concurrent sync.
    ///
    /// Dedup policy on creates:
    /// - an id already present in the vault is treated as an upsert;
    /// - an existing live item with identical `(vault_id, encrypted_data)`
    ///   is returned as-is instead of creating a duplicate (flaky-network
    ///   double submission).
    ///
    /// Conflict policy on updates: applied only when the carried base
    /// revision matches the stored `revision_date` and the new revision does
    /// not decrease; rejected updates land in `conflicts` with the server's
    /// version, and the stored row is untouched.
    #[instrument(skip(self, creates, updates, deletes), fields(vault_id = %vault_id))]
    pub async fn push(
        &self,
        vault_id: &str,
        creates: Vec<ItemCreate>,
        updates: Vec<ItemUpdate>,
        deletes: Vec<String>,
    ) -> StoreResult<PushResult> {
        let vault_id = vault_id.to_string();
        let now = Utc::now().timestamp();

        let result = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                let mut result = PushResult::default();

                for create in creates {
                    if create.id.is_empty() {
                        return Err(StoreError::InvalidArgument(
                            "item id must be client-generated and non-empty".into(),
                        ));
                    }

                    if let Some(existing) = get_in_tx(&tx, &vault_id, &create.id)? {
                        // Same id re-sent: upsert, subject to the revision
                        // rule. An accepted upsert leaves the item live even
                        // when the stored row was a tombstone.
                        if create.revision_date >= existing.revision_date {
                            tx.execute(
                                "UPDATE vault_items SET encrypted_data = ?3, revision_date = ?4, \
                                 updated_at = ?5, deleted_at = NULL \
                                 WHERE id = ?1 AND vault_id = ?2",
                                rusqlite::params![
                                    create.id,
                                    vault_id,
                                    create.encrypted_data,
                                    create.revision_date,
                                    now
                                ],
                            )?;
                            let item = get_in_tx(&tx, &vault_id, &create.id)?.ok_or(
                                StoreError::NotFound { entity: "vault item", id: create.id.clone() },
                            )?;
                            result.created.push(item);
                        } else {
                            result.conflicts.push(existing);
                        }
                        continue;
                    }

                    // Identical ciphertext already stored: double submission.
                    let duplicate = tx
                        .query_row(
                            &format!(
                                "SELECT {ITEM_COLUMNS} FROM vault_items \
                                 WHERE vault_id = ?1 AND encrypted_data = ?2 \
                                   AND deleted_at IS NULL"
                            ),
                            rusqlite::params![vault_id, create.encrypted_data],
                            row_to_item,
                        )
                        .optional()?;
                    if let Some(existing) = duplicate {
                        result.created.push(existing);
                        continue;
                    }

                    tx.execute(
                        "INSERT INTO vault_items (id, vault_id, encrypted_data, revision_date, \
                         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        rusqlite::params![
                            create.id,
                            vault_id,
                            create.encrypted_data,
                            create.revision_date,
                            now
                        ],
                    )?;
                    let item = get_in_tx(&tx, &vault_id, &create.id)?.ok_or(
                        StoreError::NotFound { entity: "vault item", id: create.id.clone() },
                    )?;
                    result.created.push(item);
                }

                for update in updates {
                    let Some(existing) = get_in_tx(&tx, &vault_id, &update.id)? else {
                        // Nothing server-side to conflict with; the item may
                        // have been purged. Skip.
                        continue;
                    };

                    let accepted = existing.deleted_at.is_none()
                        && update.last_known_revision_date == existing.revision_date
                        && update.revision_date >= existing.revision_date;

                    if !accepted {
                        result.conflicts.push(existing);
                        continue;
                    }

                    tx.execute(
                        "UPDATE vault_items SET encrypted_data = ?3, revision_date = ?4, \
                         updated_at = ?5 WHERE id = ?1 AND vault_id = ?2",
                        rusqlite::params![
                            update.id,
                            vault_id,
                            update.encrypted_data,
                            update.revision_date,
                            now
                        ],
                    )?;
                    let item = get_in_tx(&tx, &vault_id, &update.id)?.ok_or(
                        StoreError::NotFound { entity: "vault item", id: update.id.clone() },
                    )?;
                    result.updated.push(item);
                }

                for id in deletes {
                    let changed = tx.execute(
                        "UPDATE vault_items SET deleted_at = ?3, updated_at = ?3 \
                         WHERE id = ?1 AND vault_id = ?2 AND deleted_at IS NULL",
                        rusqlite::params![id, vault_id, now],
                    )?;
                    if changed > 0 {
                        result.deleted.push(id);
                    }
                }

                tx.commit()?;
                Ok(result)
            })
            .await?;

        debug!(
            created = result.created.len(),
            updated = result.updated.len(),
            deleted = result.deleted.len(),
            conflicts = result.conflicts.len(),
            "push applied"
        );
        Ok(result)
    }

    /// Tombstone a single item.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE vault_items SET deleted_at = ?2, updated_at = ?2 \
                     WHERE id = ?1 AND deleted_at IS NULL",
                    rusqlite::params![id, now],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound { entity: "vault item", id });
                }
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
