//! Shared application state for the HTTP server.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers. Every service inside is itself cheap to clone; the `Arc` keeps
//! the handler signatures uniform.

use zkvault_auth::{AccountService, TokenService};
use zkvault_store::UserStore;
use zkvault_vault::{AuditQueries, OrgService, SyncEngine, VaultService};

use crate::ServerConfig;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Registration, login and credential lifecycle.
    pub accounts: AccountService,

    /// Access/refresh token issue, verification and rotation.
    pub tokens: TokenService,

    /// User rows, for account resolution and stamp checks.
    pub users: UserStore,

    /// Vault and item operations behind access control.
    pub vaults: VaultService,

    /// The full/delta sync engine.
    pub sync: SyncEngine,

    /// Organization and membership operations.
    pub orgs: OrgService,

    /// Audit log read side.
    pub audit: AuditQueries,

    /// Server configuration.
    pub config: ServerConfig,
}
