//! Server setup and startup.
//!
//! [`ApiServer`] wires the stores and services into [`AppState`], composes
//! the Axum router with all routes registered, and binds the listener.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use tower_http::cors::CorsLayer;

use zkvault_auth::{AccountService, MemoryRateCounter, TokenConfig, TokenService};
use zkvault_store::{
    AuditStore, Database, DeviceStore, ItemStore, OrgStore, TokenStore, UserStore, VaultStore,
};
use zkvault_vault::{AuditQueries, OrgService, SyncEngine, VaultService};

use crate::ServerConfig;
use crate::state::AppState;
use crate::{accounts, auth, catalog, orgs, vaults};

/// The zkvault HTTP server.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Wire every service over a migrated database handle.
    pub fn new(config: ServerConfig, db: Database) -> Self {
        let users = UserStore::new(db.clone());
        let vault_store = VaultStore::new(db.clone());
        let item_store = ItemStore::new(db.clone());
        let org_store = OrgStore::new(db.clone());
        let audit_store = AuditStore::new(db.clone());
        let device_store = DeviceStore::new(db.clone());

        let tokens = TokenService::new(
            config.jwt_secret.as_bytes().to_vec(),
            TokenConfig {
                access_ttl_secs: config.access_ttl_secs,
                refresh_ttl_secs: config.refresh_ttl_secs,
            },
            TokenStore::new(db.clone()),
            users.clone(),
            org_store.clone(),
        );
        let accounts = AccountService::new(
            users.clone(),
            vault_store.clone(),
            device_store.clone(),
            audit_store.clone(),
            tokens.clone(),
            MemoryRateCounter::shared(),
        );

        let state = Arc::new(AppState {
            accounts,
            tokens,
            users: users.clone(),
            vaults: VaultService::new(
                vault_store.clone(),
                item_store.clone(),
                org_store.clone(),
                audit_store.clone(),
            ),
            sync: SyncEngine::new(
                users.clone(),
                vault_store.clone(),
                item_store,
                org_store.clone(),
                device_store,
                audit_store.clone(),
            ),
            orgs: OrgService::new(org_store.clone(), users, vault_store, audit_store.clone()),
            audit: AuditQueries::new(audit_store, org_store),
            config: config.clone(),
        });
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    ///
    /// Response bodies are never wrapped in an envelope field: single
    /// resources serialize as top-level objects, collection endpoints as
    /// top-level arrays. Client decoders rely on the absence of a wrapper.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(tower_http::cors::Any);

        Router::new()
            // Accounts.
            .route("/api/accounts/lookup", post(accounts::lookup))
            .route("/api/accounts/register", post(accounts::register))
            .route("/api/accounts/keys", post(accounts::init_keys))
            .route("/api/accounts/password-hint", post(accounts::password_hint))
            .route("/api/accounts/password-hint", put(accounts::set_password_hint))
            .route("/api/accounts/password", put(accounts::change_password))
            .route("/api/accounts/two-factor", post(accounts::enable_two_factor))
            .route("/api/accounts/two-factor", delete(accounts::disable_two_factor))
            // Tokens.
            .route("/api/auth/login", post(auth::login))
            .route("/api/auth/refresh", post(auth::refresh))
            .route("/api/auth/logout", post(auth::logout))
            // Sync.
            .route("/api/sync", get(vaults::sync))
            // Vaults and items.
            .route("/api/vaults", get(vaults::list_vaults))
            .route("/api/vaults", post(vaults::create_vault))
            .route("/api/vaults/{id}", get(vaults::get_vault))
            .route("/api/vaults/{id}", put(vaults::update_vault))
            .route("/api/vaults/{id}", delete(vaults::delete_vault))
            .route("/api/vaults/{id}/items", get(vaults::list_items))
            .route("/api/vaults/{id}/items", post(vaults::create_item))
            .route("/api/items/push", post(vaults::push_items))
            .route("/api/items/{id}", delete(vaults::delete_item))
            // Organizations and memberships.
            .route("/api/organizations", get(orgs::list_orgs))
            .route("/api/organizations", post(orgs::create_org))
            .route("/api/organizations/memberships", get(orgs::list_memberships))
            .route("/api/organizations/{id}", get(orgs::get_org))
            .route("/api/organizations/{id}/members", get(orgs::list_members))
            .route("/api/organizations/{id}/members", post(orgs::invite_member))
            .route(
                "/api/organizations/{id}/members/{mid}/accept",
                post(orgs::accept_invitation),
            )
            .route(
                "/api/organizations/{id}/members/{mid}/confirm",
                post(orgs::confirm_member),
            )
            .route(
                "/api/organizations/{id}/members/{mid}/role",
                put(orgs::update_role),
            )
            .route(
                "/api/organizations/{id}/members/{mid}",
                delete(orgs::revoke_member),
            )
            // Audit.
            .route("/api/audit", get(orgs::self_audit))
            .route("/api/organizations/{id}/audit", get(orgs::org_audit))
            // Public catalogue.
            .route("/api/catalog/plans", get(catalog::plans))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until it is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting api server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
