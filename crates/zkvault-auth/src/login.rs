//! Registration, login and credential lifecycle.
//!
//! Two login paths share one service:
//!
//! - **password login** for accounts that have not initialized key material:
//!   the raw password travels to the server and is checked against a salted
//!   server-side hash;
//! - **zero-knowledge login** for keyed accounts: the client derives the
//!   master key locally and presents only the master-password hash, which
//!   the server re-hashes and compares. The password itself never arrives.
//!
//! Failed attempts per email are counted through the injected
//! [`RateCounter`]; over the threshold, the flow answers `RateLimited`
//! before touching credentials at all.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use zkvault_crypto::{KdfParams, hash_server, totp, verify_server};
use zkvault_store::{
    AuditStore, DeviceStore, EventType, KeyMaterial, NewAuditEntry, User, UserStore, VaultStore,
};

use crate::error::{AuthError, AuthResult};
use crate::rate::RateCounter;
use crate::tokens::{TokenPair, TokenService};

/// Failed attempts allowed per email inside one window.
pub const LOGIN_ATTEMPT_LIMIT: u32 = 10;
/// Login rate-limit window in seconds.
pub const LOGIN_WINDOW_SECS: i64 = 300;
/// Hint requests allowed per email inside one window.
pub const HINT_ATTEMPT_LIMIT: u32 = 3;
/// Hint rate-limit window in seconds.
pub const HINT_WINDOW_SECS: i64 = 3600;
/// Registrations allowed per source address inside one window.
pub const REGISTER_ATTEMPT_LIMIT: u32 = 5;
/// Registration rate-limit window in seconds.
pub const REGISTER_WINDOW_SECS: i64 = 3600;

/// Device identity supplied with a login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: String,
}

/// Request metadata recorded in the audit log.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Key material submitted by the client during initialization.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyInit {
    pub public_key: String,
    pub encrypted_private_key: String,
    pub protected_symmetric_key: String,
    pub kdf: KdfParams,
    /// Master-password hash; becomes the transmitted credential from now on.
    pub master_password_hash: String,
}

/// Outcome of a login attempt that passed the credential check.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted, tokens issued.
    Success { user: User, tokens: TokenPair },
    /// Credentials accepted but a TOTP code is required and was not given.
    TwoFactorRequired,
}

/// Registration, login and credential lifecycle over the stores.
#[derive(Clone)]
pub struct AccountService {
    users: UserStore,
    vaults: VaultStore,
    devices: DeviceStore,
    audit: AuditStore,
    tokens: TokenService,
    rate: Arc<dyn RateCounter>,
}

impl AccountService {
    pub fn new(
        users: UserStore,
        vaults: VaultStore,
        devices: DeviceStore,
        audit: AuditStore,
        tokens: TokenService,
        rate: Arc<dyn RateCounter>,
    ) -> Self {
        Self {
            users,
            vaults,
            devices,
            audit,
            tokens,
            rate,
        }
    }

    /// Create an account with a plain password credential.
    ///
    /// The password is hashed server-side; the account stays unkeyed until
    /// [`AccountService::init_keys`] installs the key hierarchy. A default
    /// vault is created up front.
    #[instrument(skip(self, password, meta))]
    pub async fn register(
        &self,
        email: &str,
        name: Option<&str>,
        password: &str,
        meta: &RequestMeta,
    ) -> AuthResult<User> {
        let key = format!("register:{}", meta.ip.as_deref().unwrap_or("unknown"));
        if self.rate.hit(&key, REGISTER_WINDOW_SECS, Utc::now().timestamp())
            > REGISTER_ATTEMPT_LIMIT
        {
            warn!("registration rate limited");
            return Err(AuthError::RateLimited);
        }
        if password.len() < 12 {
            return Err(AuthError::InvalidRequest(
                "password must be at least 12 characters".into(),
            ));
        }
        let server_hash = hash_server(password)?;
        let user = self.users.create(email, name, Some(server_hash)).await?;
        self.vaults.ensure_default(&user.id).await?;

        self.audit(&user.id, EventType::Register, "user", Some(&user.id), meta)
            .await?;
        info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    /// Plain password login for unkeyed accounts.
    ///
    /// When the account has a TOTP secret and no code was given, the
    /// password check still runs first and a passing attempt yields
    /// [`LoginOutcome::TwoFactorRequired`] instead of tokens.
    #[instrument(skip(self, password, totp_code, meta))]
    pub async fn login_password(
        &self,
        email: &str,
        password: &str,
        totp_code: Option<&str>,
        device: Option<&DeviceInfo>,
        meta: &RequestMeta,
    ) -> AuthResult<LoginOutcome> {
        self.check_login_rate(email)?;

        let Some(user) = self.users.find_by_email(email).await? else {
            debug!("login for unknown email");
            return Err(AuthError::Unauthorized);
        };
        if user.keyed() {
            // Keyed accounts must not send the raw password.
            debug!(user_id = %user.id, "password login against keyed account");
            return Err(AuthError::Unauthorized);
        }
        let Some(stored) = user.master_password_hash.as_deref() else {
            return Err(AuthError::Unauthorized);
        };
        if !verify_server(password, stored)? {
            self.record_failure(&user, meta).await?;
            return Err(AuthError::Unauthorized);
        }

        self.finish_login(user, totp_code, device, meta).await
    }

    /// Zero-knowledge login for keyed accounts.
    ///
    /// The client sends the master-password hash, never the password; the
    /// server compares against its salted re-hash of that value.
    #[instrument(skip(self, master_password_hash, totp_code, meta))]
    pub async fn login_zk(
        &self,
        email: &str,
        master_password_hash: &str,
        totp_code: Option<&str>,
        device: Option<&DeviceInfo>,
        meta: &RequestMeta,
    ) -> AuthResult<LoginOutcome> {
        self.check_login_rate(email)?;

        let Some(user) = self.users.find_by_email(email).await? else {
            debug!("login for unknown email");
            return Err(AuthError::Unauthorized);
        };
        if !user.keyed() {
            debug!(user_id = %user.id, "zk login against unkeyed account");
            return Err(AuthError::Unauthorized);
        }
        let Some(stored) = user.master_password_hash.as_deref() else {
            return Err(AuthError::Unauthorized);
        };
        if !verify_server(master_password_hash, stored)? {
            self.record_failure(&user, meta).await?;
            return Err(AuthError::Unauthorized);
        }

        self.finish_login(user, totp_code, device, meta).await
    }

    /// Install the client-generated key hierarchy on an unkeyed account.
    ///
    /// From this point the transmitted credential is the master-password
    /// hash. Every outstanding refresh token is revoked so stale sessions
    /// carrying the old security stamp die immediately.
    #[instrument(skip(self, init, meta))]
    pub async fn init_keys(
        &self,
        user_id: &str,
        init: KeyInit,
        meta: &RequestMeta,
    ) -> AuthResult<User> {
        let Some(user) = self.users.get(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        if user.keyed() {
            return Err(AuthError::Conflict("keys already initialized".into()));
        }

        let server_hash = hash_server(&init.master_password_hash)?;
        let updated = self
            .users
            .set_keys(
                &user.id,
                KeyMaterial {
                    public_key: init.public_key,
                    encrypted_private_key: init.encrypted_private_key,
                    protected_symmetric_key: init.protected_symmetric_key,
                    kdf: init.kdf,
                },
                server_hash,
            )
            .await?;
        self.tokens.revoke_all(&user.id).await?;

        self.audit(&user.id, EventType::KeyInit, "user", Some(&user.id), meta)
            .await?;
        info!(user_id = %user.id, "key material initialized");
        Ok(updated)
    }

    /// Replace the credential hash: the new master-password hash for keyed
    /// accounts, the new password for unkeyed ones. Rotates the security
    /// stamp and revokes every refresh token.
    #[instrument(skip(self, current, new, meta))]
    pub async fn change_password(
        &self,
        user_id: &str,
        current: &str,
        new: &str,
        meta: &RequestMeta,
    ) -> AuthResult<()> {
        let Some(user) = self.users.get(user_id).await? else {
            return Err(AuthError::Unauthorized);
        };
        let Some(stored) = user.master_password_hash.as_deref() else {
            return Err(AuthError::Unauthorized);
        };
        if !verify_server(current, stored)? {
            return Err(AuthError::Unauthorized);
        }
        if !user.keyed() && new.len() < 12 {
            return Err(AuthError::InvalidRequest(
                "password must be at least 12 characters".into(),
            ));
        }

        let server_hash = hash_server(new)?;
        self.users.set_password_hash(&user.id, server_hash).await?;
        self.tokens.revoke_all(&user.id).await?;

        self.audit(
            &user.id,
            EventType::PasswordChanged,
            "user",
            Some(&user.id),
            meta,
        )
        .await?;
        info!(user_id = %user.id, "credential changed, sessions revoked");
        Ok(())
    }

    /// Store or clear the password hint.
    pub async fn set_password_hint(&self, user_id: &str, hint: Option<String>) -> AuthResult<()> {
        if let Some(h) = &hint
            && h.len() > 200
        {
            return Err(AuthError::InvalidRequest("hint too long".into()));
        }
        Ok(self.users.set_password_hint(user_id, hint).await?)
    }

    /// Request the password hint for an email.
    ///
    /// Always succeeds from the caller's point of view (delivery would be
    /// out-of-band); a hint is returned here only for accounts that have
    /// one. Tightly rate-limited per email.
    #[instrument(skip(self))]
    pub async fn password_hint(&self, email: &str) -> AuthResult<Option<String>> {
        let key = format!("hint:{}", email.trim().to_lowercase());
        if self.rate.hit(&key, HINT_WINDOW_SECS, Utc::now().timestamp()) > HINT_ATTEMPT_LIMIT {
            return Err(AuthError::RateLimited);
        }
        let hint = self
            .users
            .find_by_email(email)
            .await?
            .and_then(|u| u.password_hint);
        Ok(hint)
    }

    /// Enable TOTP: store the secret after the caller proved possession by
    /// submitting one valid code.
    pub async fn enable_two_factor(
        &self,
        user_id: &str,
        secret: &str,
        code: &str,
    ) -> AuthResult<()> {
        if !totp::verify_code(secret, code, Utc::now().timestamp())? {
            return Err(AuthError::InvalidRequest("invalid verification code".into()));
        }
        self.users
            .set_two_factor_secret(user_id, Some(secret.to_string()))
            .await?;
        Ok(())
    }

    /// Disable TOTP.
    pub async fn disable_two_factor(&self, user_id: &str) -> AuthResult<()> {
        Ok(self.users.set_two_factor_secret(user_id, None).await?)
    }

    /// Rotate a refresh token and record the rotation in the audit log.
    pub async fn refresh(&self, refresh_token: &str, meta: &RequestMeta) -> AuthResult<TokenPair> {
        let (pair, user) = self.tokens.refresh(refresh_token).await?;
        self.audit(&user.id, EventType::TokenRefresh, "user", Some(&user.id), meta)
            .await?;
        debug!(user_id = %user.id, "refresh token rotated");
        Ok(pair)
    }

    /// Log out everywhere: revoke every refresh token for the user.
    #[instrument(skip(self, meta))]
    pub async fn logout(&self, user_id: &str, meta: &RequestMeta) -> AuthResult<()> {
        let revoked = self.tokens.revoke_all(user_id).await?;
        self.audit(user_id, EventType::Logout, "user", Some(user_id), meta)
            .await?;
        debug!(user_id, revoked, "logout");
        Ok(())
    }

    // ── internals ──

    fn check_login_rate(&self, email: &str) -> AuthResult<()> {
        let key = format!("login:{}", email.trim().to_lowercase());
        if self.rate.hit(&key, LOGIN_WINDOW_SECS, Utc::now().timestamp()) > LOGIN_ATTEMPT_LIMIT {
            warn!("login attempts rate limited");
            return Err(AuthError::RateLimited);
        }
        Ok(())
    }

    async fn finish_login(
        &self,
        user: User,
        totp_code: Option<&str>,
        device: Option<&DeviceInfo>,
        meta: &RequestMeta,
    ) -> AuthResult<LoginOutcome> {
        if !user.enabled {
            return Err(AuthError::Unauthorized);
        }
        if let Some(secret) = user.two_factor_secret.as_deref() {
            let Some(code) = totp_code else {
                return Ok(LoginOutcome::TwoFactorRequired);
            };
            if !totp::verify_code(secret, code, Utc::now().timestamp())? {
                self.record_failure(&user, meta).await?;
                return Err(AuthError::Unauthorized);
            }
        }

        let device_id = match device {
            Some(d) => Some(
                self.devices
                    .touch(&user.id, &d.name, &d.device_type)
                    .await?
                    .id,
            ),
            None => None,
        };

        let tokens = self.tokens.issue(&user, device_id.as_deref()).await?;
        self.audit(&user.id, EventType::Login, "user", Some(&user.id), meta)
            .await?;
        info!(user_id = %user.id, "login succeeded");
        Ok(LoginOutcome::Success { user, tokens })
    }

    async fn record_failure(&self, user: &User, meta: &RequestMeta) -> AuthResult<()> {
        self.audit(&user.id, EventType::LoginFailed, "user", Some(&user.id), meta)
            .await
    }

    async fn audit(
        &self,
        user_id: &str,
        event: EventType,
        target_type: &'static str,
        target_id: Option<&str>,
        meta: &RequestMeta,
    ) -> AuthResult<()> {
        self.audit
            .append(NewAuditEntry {
                actor_user_id: user_id.to_string(),
                organization_id: None,
                event_type: event,
                target_type,
                target_id: target_id.map(|s| s.to_string()),
                ip: meta.ip.clone(),
                user_agent: meta.user_agent.clone(),
                metadata: serde_json::Value::Null,
            })
            .await?;
        Ok(())
    }
}
