//! zkvault-vault — vault access control, sync and organization sharing.
//!
//! The stores in `zkvault-store` are plain row operations; this crate is
//! where the authenticated [`Caller`] enters the picture:
//!
//! - [`vaults`]: vault and item CRUD behind access checks, including the
//!   transactional bulk push with conflict detection;
//! - [`sync`]: the full/delta sync engine;
//! - [`orgs`]: the membership state machine and wrapped-key handling;
//! - [`audit`]: the read side of the audit log.

pub mod access;
pub mod audit;
pub mod error;
pub mod orgs;
pub mod sync;
pub mod vaults;

pub use access::{Caller, VaultAccess};
pub use audit::AuditQueries;
pub use error::{VaultError, VaultResult};
pub use orgs::OrgService;
pub use sync::{SyncEngine, SyncProfile, SyncRequest, SyncResponse};
pub use vaults::VaultService;
