//! User account persistence.
//!
//! A user is "keyed" iff `public_key`, `encrypted_private_key` and
//! `protected_symmetric_key` are all present — that boolean alone drives the
//! login-method decision. The server stores only the re-hashed transmitted
//! credential (`master_password_hash` column), never a password or master
//! key.

use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;
use zkvault_crypto::{KdfParams, KdfType};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A user account row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier (UUID v7).
    pub id: String,
    /// Unique, case-normalized email.
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Server-side storage hash of the transmitted credential
    /// (`base64(salt):base64(hash)`), or `None` for billing-only accounts.
    #[serde(skip_serializing, default)]
    pub master_password_hash: Option<String>,
    /// Asymmetric public key, stored in the clear.
    pub public_key: Option<String>,
    /// Private key wrapped under the symmetric key. Opaque.
    pub encrypted_private_key: Option<String>,
    /// Symmetric account key wrapped under the master key. Opaque.
    pub protected_symmetric_key: Option<String>,
    /// Published KDF parameters for this account.
    pub kdf: KdfParams,
    /// Base64 TOTP secret; second factor is required when set.
    #[serde(skip_serializing, default)]
    pub two_factor_secret: Option<String>,
    /// Optional password hint (delivered out of band, never in lookups).
    pub password_hint: Option<String>,
    /// Rotated on password change and key initialization; access tokens
    /// carry it and stale stamps are rejected wherever the user is loaded.
    pub security_stamp: String,
    /// Whether the user can log in.
    pub enabled: bool,
    /// Unix timestamp when the user was created.
    pub created_at: i64,
    /// Unix timestamp when the user was last updated.
    pub updated_at: i64,
}

impl User {
    /// True iff all three key-hierarchy fields are present.
    pub fn keyed(&self) -> bool {
        self.public_key.is_some()
            && self.encrypted_private_key.is_some()
            && self.protected_symmetric_key.is_some()
    }
}

/// The client-supplied key material set during initialization.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub public_key: String,
    pub encrypted_private_key: String,
    pub protected_symmetric_key: String,
    pub kdf: KdfParams,
}

// ═══════════════════════════════════════════════════════════════════════
//  UserStore
// ═══════════════════════════════════════════════════════════════════════

const USER_COLUMNS: &str = "id, email, name, master_password_hash, public_key, \
     encrypted_private_key, protected_symmetric_key, kdf_type, kdf_iterations, \
     kdf_memory, kdf_parallelism, two_factor_secret, password_hint, \
     security_stamp, enabled, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let kdf_type: i32 = row.get(7)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        master_password_hash: row.get(3)?,
        public_key: row.get(4)?,
        encrypted_private_key: row.get(5)?,
        protected_symmetric_key: row.get(6)?,
        kdf: KdfParams {
            kdf_type: KdfType::try_from(kdf_type).unwrap_or(KdfType::Pbkdf2Sha256),
            iterations: row.get(8)?,
            memory_mib: row.get(9)?,
            parallelism: row.get(10)?,
        },
        two_factor_secret: row.get(11)?,
        password_hint: row.get(12)?,
        security_stamp: row.get(13)?,
        enabled: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// CRUD operations on user accounts.
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a new user store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new, unkeyed account.
    ///
    /// `master_password_hash` is the already-server-hashed credential, or
    /// `None` for accounts created by external (billing) flows.
    #[instrument(skip(self, master_password_hash))]
    pub async fn create(
        &self,
        email: &str,
        name: Option<&str>,
        master_password_hash: Option<String>,
    ) -> StoreResult<User> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(StoreError::InvalidArgument("invalid email".into()));
        }

        let user = User {
            id: Uuid::now_v7().to_string(),
            email,
            name: name.map(|s| s.to_string()),
            master_password_hash,
            public_key: None,
            encrypted_private_key: None,
            protected_symmetric_key: None,
            kdf: KdfParams::pbkdf2_default(),
            two_factor_secret: None,
            password_hint: None,
            security_stamp: Uuid::now_v7().to_string(),
            enabled: true,
            created_at: Utc::now().timestamp(),
            updated_at: Utc::now().timestamp(),
        };

        let u = user.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, email, name, master_password_hash, kdf_type, \
                     kdf_iterations, kdf_memory, kdf_parallelism, security_stamp, enabled, \
                     created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
                    rusqlite::params![
                        u.id,
                        u.email,
                        u.name,
                        u.master_password_hash,
                        i32::from(u.kdf.kdf_type),
                        u.kdf.iterations,
                        u.kdf.memory_mib,
                        u.kdf.parallelism,
                        u.security_stamp,
                        u.created_at,
                    ],
                )
                .map_err(|e| {
                    if let rusqlite::Error::SqliteFailure(ref err, _) = e
                        && err.code == rusqlite::ErrorCode::ConstraintViolation
                    {
                        return StoreError::Conflict(format!("email already registered: {}", u.email));
                    }
                    StoreError::Sqlite(e)
                })?;
                Ok(())
            })
            .await?;

        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Fetch a user by id, returning `None` if absent.
    pub async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        rusqlite::params![id],
                        row_to_user,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
    }

    /// Fetch a user by case-normalized email, returning `None` if absent.
    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        self.db
            .execute(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                        rusqlite::params![email],
                        row_to_user,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
    }

    /// Install the key hierarchy produced by the initialization flow.
    ///
    /// Replaces the stored credential hash (the transmitted credential is
    /// now the master-password hash, not the raw password) and rotates the
    /// security stamp. Key fields, once set, are only replaced through an
    /// explicit re-initialization — callers enforce that the account is
    /// currently unkeyed.
    #[instrument(skip(self, keys, server_hash))]
    pub async fn set_keys(
        &self,
        id: &str,
        keys: KeyMaterial,
        server_hash: String,
    ) -> StoreResult<User> {
        let id = id.to_string();
        let new_stamp = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();

        let lookup_id = id.clone();
        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET public_key = ?2, encrypted_private_key = ?3, \
                     protected_symmetric_key = ?4, master_password_hash = ?5, kdf_type = ?6, \
                     kdf_iterations = ?7, kdf_memory = ?8, kdf_parallelism = ?9, \
                     security_stamp = ?10, updated_at = ?11 \
                     WHERE id = ?1",
                    rusqlite::params![
                        id,
                        keys.public_key,
                        keys.encrypted_private_key,
                        keys.protected_symmetric_key,
                        server_hash,
                        i32::from(keys.kdf.kdf_type),
                        keys.kdf.iterations,
                        keys.kdf.memory_mib,
                        keys.kdf.parallelism,
                        new_stamp,
                        now,
                    ],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound {
                        entity: "user",
                        id,
                    });
                }
                Ok(())
            })
            .await?;

        self.get(&lookup_id).await?.ok_or(StoreError::NotFound {
            entity: "user",
            id: lookup_id,
        })
    }

    /// Replace the stored credential hash and rotate the security stamp.
    ///
    /// Used by password change; the caller is responsible for revoking
    /// refresh tokens afterwards.
    #[instrument(skip(self, server_hash))]
    pub async fn set_password_hash(&self, id: &str, server_hash: String) -> StoreResult<()> {
        let id = id.to_string();
        let new_stamp = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET master_password_hash = ?2, security_stamp = ?3, \
                     updated_at = ?4 WHERE id = ?1",
                    rusqlite::params![id, server_hash, new_stamp, now],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound { entity: "user", id });
                }
                Ok(())
            })
            .await
    }

    /// Set or clear the password hint.
    pub async fn set_password_hint(&self, id: &str, hint: Option<String>) -> StoreResult<()> {
        let id = id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE users SET password_hint = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, hint, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Set or clear the TOTP secret.
    pub async fn set_two_factor_secret(&self, id: &str, secret: Option<String>) -> StoreResult<()> {
        let id = id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE users SET two_factor_secret = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, secret, now],
                )?;
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
