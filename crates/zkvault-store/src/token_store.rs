//! Refresh-token persistence.
//!
//! Refresh tokens are opaque, persisted and single-use. The rotation in
//! [`TokenStore::rotate`] is one transaction: the presented row is consumed
//! and the replacement inserted atomically, so two concurrent refresh
//! attempts with the same token cannot both succeed (a replay window
//! otherwise).

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// Owner information recovered while consuming a refresh token.
#[derive(Debug, Clone)]
pub struct ConsumedToken {
    pub user_id: String,
    pub device_id: Option<String>,
}

/// Refresh-token row operations.
#[derive(Clone)]
pub struct TokenStore {
    db: Database,
}

impl TokenStore {
    /// Create a new token store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a freshly issued refresh token.
    #[instrument(skip(self, token))]
    pub async fn insert(
        &self,
        token: &str,
        user_id: &str,
        device_id: Option<&str>,
        expires_at: i64,
    ) -> StoreResult<()> {
        let token = token.to_string();
        let user_id = user_id.to_string();
        let device_id = device_id.map(|s| s.to_string());
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO refresh_tokens (token, user_id, device_id, expires_at, \
                     created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![token, user_id, device_id, expires_at, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Atomically consume `old_token` and persist `new_token` in its place.
    ///
    /// Returns `None` when the presented token is absent or expired — the
    /// two cases are indistinguishable on purpose. Expired rows are removed
    /// opportunistically while we hold the transaction.
    #[instrument(skip(self, old_token, new_token))]
    pub async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        new_expires_at: i64,
    ) -> StoreResult<Option<ConsumedToken>> {
        let old_token = old_token.to_string();
        let new_token = new_token.to_string();
        let now = Utc::now().timestamp();

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let row = tx
                    .query_row(
                        "SELECT user_id, device_id, expires_at FROM refresh_tokens \
                         WHERE token = ?1",
                        rusqlite::params![old_token],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, Option<String>>(1)?,
                                row.get::<_, i64>(2)?,
                            ))
                        },
                    )
                    .optional()?;

                // Consume the presented token unconditionally: even an
                // expired token should not be presentable twice.
                tx.execute(
                    "DELETE FROM refresh_tokens WHERE token = ?1",
                    rusqlite::params![old_token],
                )?;

                let Some((user_id, device_id, expires_at)) = row else {
                    tx.commit()?;
                    return Ok(None);
                };
                if expires_at <= now {
                    tx.commit()?;
                    debug!("presented refresh token was expired");
                    return Ok(None);
                }

                tx.execute(
                    "INSERT INTO refresh_tokens (token, user_id, device_id, expires_at, \
                     created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![new_token, user_id, device_id, new_expires_at, now],
                )?;
                tx.commit()?;

                Ok(Some(ConsumedToken { user_id, device_id }))
            })
            .await
    }

    /// Delete every refresh token for a user, across all devices.
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: &str) -> StoreResult<u64> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let n = conn.execute(
                    "DELETE FROM refresh_tokens WHERE user_id = ?1",
                    rusqlite::params![user_id],
                )?;
                Ok(n as u64)
            })
            .await
    }

    /// Count live tokens for a user. Test and diagnostics helper.
    pub async fn count_for_user(&self, user_id: &str) -> StoreResult<i64> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let c: i64 = conn.query_row(
                    "SELECT count(*) FROM refresh_tokens WHERE user_id = ?1",
                    rusqlite::params![user_id],
                    |row| row.get(0),
                )?;
                Ok(c)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
