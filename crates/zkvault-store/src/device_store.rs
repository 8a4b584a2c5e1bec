//! Device registry.
//!
//! Tracks `(user, name, type)` triples to a stable identifier and a
//! last-active timestamp. Devices exist for multi-device visibility in the
//! sync profile; they carry no authorization weight.

use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;
use crate::error::StoreResult;

/// A registered device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Free-form type string supplied by the client ("ios", "cli", ...).
    pub device_type: String,
    pub last_active_at: i64,
    pub created_at: i64,
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        device_type: row.get(3)?,
        last_active_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const DEVICE_COLUMNS: &str = "id, user_id, name, device_type, last_active_at, created_at";

/// Device row operations.
#[derive(Clone)]
pub struct DeviceStore {
    db: Database,
}

impl DeviceStore {
    /// Create a new device store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the stable device for `(user, name, type)`, creating it on
    /// first sight and bumping `last_active_at` otherwise.
    #[instrument(skip(self))]
    pub async fn touch(&self, user_id: &str, name: &str, device_type: &str) -> StoreResult<Device> {
        let user_id = user_id.to_string();
        let name = name.to_string();
        let device_type = device_type.to_string();
        let candidate_id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let existing = tx
                    .query_row(
                        &format!(
                            "SELECT {DEVICE_COLUMNS} FROM devices \
                             WHERE user_id = ?1 AND name = ?2 AND device_type = ?3"
                        ),
                        rusqlite::params![user_id, name, device_type],
                        row_to_device,
                    )
                    .optional()?;

                let device = match existing {
                    Some(mut d) => {
                        tx.execute(
                            "UPDATE devices SET last_active_at = ?2 WHERE id = ?1",
                            rusqlite::params![d.id, now],
                        )?;
                        d.last_active_at = now;
                        d
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO devices (id, user_id, name, device_type, \
                             last_active_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                            rusqlite::params![candidate_id, user_id, name, device_type, now],
                        )?;
                        Device {
                            id: candidate_id,
                            user_id,
                            name,
                            device_type,
                            last_active_at: now,
                            created_at: now,
                        }
                    }
                };

                tx.commit()?;
                Ok(device)
            })
            .await
    }

    /// All devices for a user, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Device>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = ?1 \
                     ORDER BY last_active_at DESC"
                ))?;
                let devices = stmt
                    .query_map(rusqlite::params![user_id], row_to_device)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(devices)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_store::UserStore;

    #[tokio::test]
    async fn touch_is_stable_per_triple() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let users = UserStore::new(db.clone());
        let u = users.create("a@x.com", None, None).await.unwrap();
        let devices = DeviceStore::new(db);

        let first = devices.touch(&u.id, "laptop", "cli").await.unwrap();
        let second = devices.touch(&u.id, "laptop", "cli").await.unwrap();
        assert_eq!(first.id, second.id);

        let other = devices.touch(&u.id, "phone", "ios").await.unwrap();
        assert_ne!(first.id, other.id);

        assert_eq!(devices.list_for_user(&u.id).await.unwrap().len(), 2);
    }
}
