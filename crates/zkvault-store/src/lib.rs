//! SQLite persistence for zkvault.
//!
//! This crate owns the data model of the vault service: users and their
//! opaque key material, vaults and vault items, organizations and
//! memberships, devices, refresh tokens and the append-only audit log.
//!
//! # Modules
//!
//! - [`db`] — the `rusqlite` connection wrapper (WAL, `spawn_blocking`).
//! - [`migration`] — versioned schema migrations.
//! - [`user_store`], [`vault_store`], [`item_store`], [`org_store`],
//!   [`device_store`], [`token_store`], [`audit_store`] — one store per
//!   table family, all `Clone` over the shared [`Database`] handle.
//! - [`error`] — unified error types.
//!
//! Everything the client encrypts stays an uninterpreted string in here:
//! `encrypted_data`, `encrypted_name`, the wrapped keys. No code path
//! parses them.

pub mod audit_store;
pub mod db;
pub mod device_store;
pub mod error;
pub mod item_store;
pub mod migration;
pub mod org_store;
pub mod token_store;
pub mod user_store;
pub mod vault_store;

// Re-export the most commonly used types at the crate root for convenience.
pub use audit_store::{AuditEntry, AuditStore, EventType, NewAuditEntry};
pub use db::Database;
pub use device_store::{Device, DeviceStore};
pub use error::{StoreError, StoreResult};
pub use item_store::{ItemCreate, ItemStore, ItemUpdate, PushResult, VaultItem};
pub use org_store::{MembershipStatus, OrgMembership, OrgPlan, OrgRole, OrgStore, Organization};
pub use token_store::{ConsumedToken, TokenStore};
pub use user_store::{KeyMaterial, User, UserStore};
pub use vault_store::{Vault, VaultOwner, VaultStore};
