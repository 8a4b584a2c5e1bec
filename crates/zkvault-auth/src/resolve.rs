//! Account resolution: given an email, tell the client how to log in.
//!
//! The answer is the same shape whether or not the account exists, and the
//! KDF parameters returned for unknown emails are the real defaults, so the
//! endpoint cannot be used to enumerate accounts.

use serde::{Deserialize, Serialize};
use tracing::instrument;
use zkvault_crypto::KdfParams;
use zkvault_store::UserStore;

use crate::error::AuthResult;

/// How the client should authenticate for this email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// No keyed account: register, then initialize key material.
    Register,
    /// Account exists but has no key material yet; plain password login.
    PasswordLogin,
    /// Keyed account: derive the master key client-side and present the
    /// master password hash.
    ZkLogin,
}

/// The resolution result handed back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLookup {
    pub method: LoginMethod,
    /// KDF parameters the client must use to derive the master key. Real
    /// parameters for keyed accounts, current defaults otherwise.
    pub kdf: KdfParams,
    /// Whether a second factor will be demanded after the password step.
    pub requires_two_factor: bool,
}

/// Resolve the login method for an email.
///
/// Unknown emails resolve to [`LoginMethod::Register`] with default KDF
/// parameters rather than an error.
#[instrument(skip(users))]
pub async fn resolve(users: &UserStore, email: &str) -> AuthResult<AccountLookup> {
    let Some(user) = users.find_by_email(email).await? else {
        return Ok(AccountLookup {
            method: LoginMethod::Register,
            kdf: KdfParams::pbkdf2_default(),
            requires_two_factor: false,
        });
    };

    let method = if user.keyed() {
        LoginMethod::ZkLogin
    } else {
        LoginMethod::PasswordLogin
    };

    Ok(AccountLookup {
        method,
        kdf: user.kdf,
        requires_two_factor: user.two_factor_secret.is_some(),
    })
}

// ── tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use zkvault_crypto::KdfType;
    use zkvault_store::{Database, KeyMaterial};

    async fn store() -> UserStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        UserStore::new(db)
    }

    #[tokio::test]
    async fn unknown_email_resolves_to_register_with_defaults() {
        let users = store().await;
        let lookup = resolve(&users, "nobody@example.com").await.unwrap();
        assert_eq!(lookup.method, LoginMethod::Register);
        assert_eq!(lookup.kdf.kdf_type, KdfType::Pbkdf2Sha256);
        assert!(!lookup.requires_two_factor);
    }

    #[tokio::test]
    async fn unkeyed_account_resolves_to_password_login() {
        let users = store().await;
        users
            .create("ada@example.com", None, Some("hash".into()))
            .await
            .unwrap();
        let lookup = resolve(&users, "ada@example.com").await.unwrap();
        assert_eq!(lookup.method, LoginMethod::PasswordLogin);
    }

    #[tokio::test]
    async fn keyed_account_resolves_to_zk_login_with_real_kdf() {
        let users = store().await;
        let u = users
            .create("ada@example.com", None, Some("hash".into()))
            .await
            .unwrap();
        users
            .set_keys(
                &u.id,
                KeyMaterial {
                    public_key: "pk".into(),
                    encrypted_private_key: "epk".into(),
                    protected_symmetric_key: "psk".into(),
                    kdf: KdfParams::argon2_default(),
                },
                "server-hash".into(),
            )
            .await
            .unwrap();

        let lookup = resolve(&users, "ADA@example.com").await.unwrap();
        assert_eq!(lookup.method, LoginMethod::ZkLogin);
        assert_eq!(lookup.kdf.kdf_type, KdfType::Argon2id);
    }
}
