//! The token service: stateless access tokens, persisted refresh tokens.
//!
//! Two deliberately distinct credentials:
//!
//! - the **access token** is a signed HS256 compact token verified without
//!   any store lookup — signature plus expiry, nothing else on the hot path;
//! - the **refresh token** is opaque, persisted and single-use; presenting
//!   it consumes it and mints a replacement pair in one transaction.
//!
//! Every verification failure is [`AuthError::Unauthorized`], with the
//! internal cause logged, never returned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use zkvault_crypto::jwt;
use zkvault_store::{MembershipStatus, OrgStore, TokenStore, User, UserStore};

use crate::error::{AuthError, AuthResult};

/// Default access-token lifetime in seconds.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 900;

/// Default refresh-token lifetime in seconds (90 days).
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 90 * 86_400;

/// Token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
        }
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Case-normalized email.
    pub email: String,
    /// Device the token was issued to, when known.
    pub device: Option<String>,
    /// Organizations with a confirmed membership at issue time.
    pub orgs: Vec<String>,
    /// The user's security stamp at issue time. Handlers that load the user
    /// reject tokens whose stamp no longer matches.
    pub stamp: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// An issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds, for the client.
    pub expires_in: i64,
}

/// Issues, verifies, rotates and revokes tokens.
#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    config: TokenConfig,
    tokens: TokenStore,
    users: UserStore,
    orgs: OrgStore,
}

impl TokenService {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        config: TokenConfig,
        tokens: TokenStore,
        users: UserStore,
        orgs: OrgStore,
    ) -> Self {
        Self {
            secret: secret.into(),
            config,
            tokens,
            users,
            orgs,
        }
    }

    /// Issue a fresh pair for a user, embedding their confirmed org set.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue(&self, user: &User, device_id: Option<&str>) -> AuthResult<TokenPair> {
        let org_ids = self.confirmed_org_ids(&user.id).await?;
        let now = Utc::now().timestamp();

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            device: device_id.map(|s| s.to_string()),
            orgs: org_ids,
            stamp: user.security_stamp.clone(),
            iat: now,
            exp: now + self.config.access_ttl_secs,
        };

        let access_token = jwt::encode_hs256(&self.secret, &claims)?;
        let refresh_token = zkvault_crypto::random_token()?;
        self.tokens
            .insert(
                &refresh_token,
                &user.id,
                device_id,
                now + self.config.refresh_ttl_secs,
            )
            .await?;

        debug!(user_id = %user.id, "token pair issued");
        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl_secs,
        })
    }

    /// Verify an access token: signature and expiry only, no store lookup.
    pub fn verify(&self, access_token: &str) -> AuthResult<Claims> {
        let claims: Claims = jwt::decode_hs256(&self.secret, access_token).map_err(|e| {
            debug!(error = %e, "access token rejected");
            AuthError::Unauthorized
        })?;
        if claims.exp <= Utc::now().timestamp() {
            debug!(sub = %claims.sub, "access token expired");
            return Err(AuthError::Unauthorized);
        }
        Ok(claims)
    }

    /// Rotate a refresh token: consume it and mint a new pair.
    ///
    /// The consume-and-replace is a single transaction in the store; two
    /// concurrent presentations of the same token cannot both succeed.
    /// Returns the new pair and the owning user.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<(TokenPair, User)> {
        let now = Utc::now().timestamp();
        let new_refresh = zkvault_crypto::random_token()?;

        let consumed = self
            .tokens
            .rotate(refresh_token, &new_refresh, now + self.config.refresh_ttl_secs)
            .await?
            .ok_or_else(|| {
                debug!("refresh token rejected");
                AuthError::Unauthorized
            })?;

        let Some(user) = self.users.get(&consumed.user_id).await? else {
            warn!(user_id = %consumed.user_id, "refresh token referenced a missing user");
            return Err(AuthError::Unauthorized);
        };
        if !user.enabled {
            return Err(AuthError::Unauthorized);
        }

        let org_ids = self.confirmed_org_ids(&user.id).await?;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            device: consumed.device_id.clone(),
            orgs: org_ids,
            stamp: user.security_stamp.clone(),
            iat: now,
            exp: now + self.config.access_ttl_secs,
        };
        let access_token = jwt::encode_hs256(&self.secret, &claims)?;

        Ok((
            TokenPair {
                access_token,
                refresh_token: new_refresh,
                expires_in: self.config.access_ttl_secs,
            },
            user,
        ))
    }

    /// Invalidate every outstanding refresh token for a user, all devices.
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: &str) -> AuthResult<u64> {
        Ok(self.tokens.revoke_all(user_id).await?)
    }

    async fn confirmed_org_ids(&self, user_id: &str) -> AuthResult<Vec<String>> {
        let memberships = self.orgs.memberships_for_user(user_id).await?;
        Ok(memberships
            .into_iter()
            .filter(|m| m.status == MembershipStatus::Confirmed)
            .map(|m| m.organization_id)
            .collect())
    }
}
