//! Schema migration system.
//!
//! Migrations are static SQL strings keyed by version number. Applied
//! versions are tracked in a `_migrations` table so running them is
//! idempotent.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "identity and vault core — users, vaults, vault_items, devices, refresh_tokens",
        sql: r#"
            CREATE TABLE users (
                id                      TEXT PRIMARY KEY,
                email                   TEXT NOT NULL UNIQUE,
                name                    TEXT,
                master_password_hash    TEXT,
                public_key              TEXT,
                encrypted_private_key   TEXT,
                protected_symmetric_key TEXT,
                kdf_type                INTEGER NOT NULL DEFAULT 0,
                kdf_iterations          INTEGER NOT NULL DEFAULT 600000,
                kdf_memory              INTEGER NOT NULL DEFAULT 0,
                kdf_parallelism         INTEGER NOT NULL DEFAULT 0,
                two_factor_secret       TEXT,
                password_hint           TEXT,
                security_stamp          TEXT NOT NULL,
                enabled                 BOOLEAN NOT NULL DEFAULT 1,
                created_at              INTEGER NOT NULL,
                updated_at              INTEGER NOT NULL
            );
            CREATE INDEX idx_users_email ON users(email);

            CREATE TABLE vaults (
                id              TEXT PRIMARY KEY,
                user_id         TEXT REFERENCES users(id),
                organization_id TEXT,
                encrypted_name  TEXT NOT NULL,
                is_default      BOOLEAN NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                CHECK ((user_id IS NULL) != (organization_id IS NULL))
            );
            CREATE INDEX idx_vaults_user ON vaults(user_id);
            CREATE INDEX idx_vaults_org ON vaults(organization_id);
            CREATE UNIQUE INDEX idx_vaults_default
                ON vaults(user_id) WHERE is_default = 1;

            CREATE TABLE vault_items (
                id             TEXT PRIMARY KEY,
                vault_id       TEXT NOT NULL REFERENCES vaults(id) ON DELETE CASCADE,
                encrypted_data TEXT NOT NULL,
                revision_date  INTEGER NOT NULL,
                deleted_at     INTEGER,
                created_at     INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL
            );
            CREATE INDEX idx_vault_items_vault ON vault_items(vault_id);
            CREATE INDEX idx_vault_items_updated ON vault_items(updated_at);

            CREATE TABLE devices (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL REFERENCES users(id),
                name           TEXT NOT NULL,
                device_type    TEXT NOT NULL,
                last_active_at INTEGER NOT NULL,
                created_at     INTEGER NOT NULL,
                UNIQUE(user_id, name, device_type)
            );

            CREATE TABLE refresh_tokens (
                token      TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL REFERENCES users(id),
                device_id  TEXT,
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX idx_refresh_tokens_user ON refresh_tokens(user_id);
        "#,
    },
    Migration {
        version: 2,
        description: "organizations, memberships and audit log",
        sql: r#"
            CREATE TABLE organizations (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                billing_email TEXT NOT NULL,
                plan          TEXT NOT NULL CHECK(plan IN ('free','team','enterprise')),
                max_members   INTEGER NOT NULL,
                max_vaults    INTEGER NOT NULL,
                created_at    INTEGER NOT NULL,
                updated_at    INTEGER NOT NULL
            );

            CREATE TABLE org_memberships (
                id                TEXT PRIMARY KEY,
                organization_id   TEXT NOT NULL REFERENCES organizations(id),
                user_id           TEXT REFERENCES users(id),
                invited_email     TEXT NOT NULL,
                role              TEXT NOT NULL CHECK(role IN ('owner','admin','member','readonly')),
                status            TEXT NOT NULL CHECK(status IN ('invited','accepted','confirmed','revoked')),
                encrypted_org_key TEXT,
                created_at        INTEGER NOT NULL,
                updated_at        INTEGER NOT NULL
            );
            CREATE INDEX idx_org_memberships_org ON org_memberships(organization_id);
            CREATE INDEX idx_org_memberships_user ON org_memberships(user_id);
            CREATE UNIQUE INDEX idx_org_memberships_owner
                ON org_memberships(organization_id) WHERE role = 'owner';

            CREATE TABLE audit_log (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_user_id   TEXT NOT NULL,
                organization_id TEXT,
                event_type      TEXT NOT NULL,
                target_type     TEXT NOT NULL,
                target_id       TEXT,
                ip              TEXT,
                user_agent      TEXT,
                metadata        TEXT NOT NULL DEFAULT '{}',
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX idx_audit_log_actor ON audit_log(actor_user_id);
            CREATE INDEX idx_audit_log_org ON audit_log(organization_id);
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;
    Ok(())
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    // The shared connection is behind `&Connection` here, so the transaction
    // is managed manually instead of via `conn.transaction()`.
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────
