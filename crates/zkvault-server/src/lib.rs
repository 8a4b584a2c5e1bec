//! HTTP API for zkvault.
//!
//! This crate exposes the credential vault over a JSON REST API:
//!
//! - account resolution, registration and key initialization;
//! - the two login grants, token refresh and logout;
//! - full/delta sync;
//! - vault and item CRUD with the bulk push endpoint;
//! - organization membership lifecycle and audit queries;
//! - a public plan catalogue gated by a static app key.
//!
//! The server itself stores only ciphertext: encrypted names, encrypted
//! payloads and wrapped keys pass through as opaque strings.

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod extract;
pub mod orgs;
pub mod server;
pub mod state;
pub mod vaults;

pub use error::{ApiError, ApiResult};
pub use server::ApiServer;
pub use state::AppState;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
    /// HMAC secret for access-token signing.
    pub jwt_secret: String,
    /// Static app-identity key for the public catalogue endpoint.
    pub catalog_api_key: String,
    /// Access-token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh-token lifetime in seconds.
    pub refresh_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 8200,
            jwt_secret: String::new(),
            catalog_api_key: String::new(),
            access_ttl_secs: zkvault_auth::tokens::DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: zkvault_auth::tokens::DEFAULT_REFRESH_TTL_SECS,
        }
    }
}
