//! End-to-end authentication flows against an in-memory database.

use std::sync::Arc;

use zkvault_auth::{
    resolve, AccountService, AuthError, DeviceInfo, KeyInit, LoginMethod, LoginOutcome,
    MemoryRateCounter, RequestMeta, TokenConfig, TokenService, LOGIN_ATTEMPT_LIMIT,
};
use zkvault_crypto::KdfParams;
use zkvault_store::{
    AuditStore, Database, DeviceStore, OrgStore, TokenStore, UserStore, VaultStore,
};

const PASSWORD: &str = "correct horse battery staple";

struct Harness {
    accounts: AccountService,
    tokens: TokenService,
    users: UserStore,
}

async fn harness() -> Harness {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();

    let users = UserStore::new(db.clone());
    let tokens = TokenService::new(
        b"integration-test-secret".to_vec(),
        TokenConfig::default(),
        TokenStore::new(db.clone()),
        users.clone(),
        OrgStore::new(db.clone()),
    );
    let accounts = AccountService::new(
        users.clone(),
        VaultStore::new(db.clone()),
        DeviceStore::new(db.clone()),
        AuditStore::new(db.clone()),
        tokens.clone(),
        MemoryRateCounter::shared(),
    );
    Harness {
        accounts,
        tokens,
        users,
    }
}

fn key_init() -> KeyInit {
    KeyInit {
        public_key: "b64:public".into(),
        encrypted_private_key: "b64:nonce:b64:private".into(),
        protected_symmetric_key: "b64:nonce:b64:sym".into(),
        kdf: KdfParams::pbkdf2_default(),
        master_password_hash: "b64:master-password-hash".into(),
    }
}

fn expect_success(outcome: LoginOutcome) -> zkvault_auth::TokenPair {
    match outcome {
        LoginOutcome::Success { tokens, .. } => tokens,
        LoginOutcome::TwoFactorRequired => panic!("unexpected two-factor challenge"),
    }
}

#[tokio::test]
async fn register_then_password_login() {
    let h = harness().await;
    let meta = RequestMeta::default();
    h.accounts
        .register("ada@example.com", Some("Ada"), PASSWORD, &meta)
        .await
        .unwrap();

    let outcome = h
        .accounts
        .login_password("Ada@Example.com", PASSWORD, None, None, &meta)
        .await
        .unwrap();
    let pair = expect_success(outcome);

    let claims = h.tokens.verify(&pair.access_token).unwrap();
    assert_eq!(claims.email, "ada@example.com");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let h = harness().await;
    let meta = RequestMeta::default();
    h.accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();

    let wrong = h
        .accounts
        .login_password("ada@example.com", "not the password", None, None, &meta)
        .await
        .unwrap_err();
    let unknown = h
        .accounts
        .login_password("ghost@example.com", PASSWORD, None, None, &meta)
        .await
        .unwrap_err();

    assert!(matches!(wrong, AuthError::Unauthorized));
    assert!(matches!(unknown, AuthError::Unauthorized));
}

#[tokio::test]
async fn key_init_switches_account_to_zk_login() {
    let h = harness().await;
    let meta = RequestMeta::default();
    let user = h
        .accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();

    let lookup = resolve(&h.users, "ada@example.com").await.unwrap();
    assert_eq!(lookup.method, LoginMethod::PasswordLogin);

    let init = key_init();
    let mph = init.master_password_hash.clone();
    h.accounts.init_keys(&user.id, init, &meta).await.unwrap();

    let lookup = resolve(&h.users, "ada@example.com").await.unwrap();
    assert_eq!(lookup.method, LoginMethod::ZkLogin);

    // The raw password no longer works; the master-password hash does.
    let err = h
        .accounts
        .login_password("ada@example.com", PASSWORD, None, None, &meta)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));

    let outcome = h
        .accounts
        .login_zk("ada@example.com", &mph, None, None, &meta)
        .await
        .unwrap();
    expect_success(outcome);
}

#[tokio::test]
async fn init_keys_twice_conflicts() {
    let h = harness().await;
    let meta = RequestMeta::default();
    let user = h
        .accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();
    h.accounts
        .init_keys(&user.id, key_init(), &meta)
        .await
        .unwrap();

    let err = h
        .accounts
        .init_keys(&user.id, key_init(), &meta)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let h = harness().await;
    let meta = RequestMeta::default();
    h.accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();
    let pair = expect_success(
        h.accounts
            .login_password("ada@example.com", PASSWORD, None, None, &meta)
            .await
            .unwrap(),
    );

    let (next, user) = h.tokens.refresh(&pair.refresh_token).await.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_ne!(next.refresh_token, pair.refresh_token);

    // Replaying the consumed token fails; the replacement still works.
    let err = h.tokens.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));
    h.tokens.refresh(&next.refresh_token).await.unwrap();
}

#[tokio::test]
async fn logout_revokes_every_device() {
    let h = harness().await;
    let meta = RequestMeta::default();
    let user = h
        .accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();

    let laptop = DeviceInfo {
        name: "laptop".into(),
        device_type: "desktop".into(),
    };
    let phone = DeviceInfo {
        name: "phone".into(),
        device_type: "mobile".into(),
    };
    let a = expect_success(
        h.accounts
            .login_password("ada@example.com", PASSWORD, None, Some(&laptop), &meta)
            .await
            .unwrap(),
    );
    let b = expect_success(
        h.accounts
            .login_password("ada@example.com", PASSWORD, None, Some(&phone), &meta)
            .await
            .unwrap(),
    );

    h.accounts.logout(&user.id, &meta).await.unwrap();

    assert!(h.tokens.refresh(&a.refresh_token).await.is_err());
    assert!(h.tokens.refresh(&b.refresh_token).await.is_err());
}

#[tokio::test]
async fn tampered_access_token_is_rejected() {
    let h = harness().await;
    let meta = RequestMeta::default();
    h.accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();
    let pair = expect_success(
        h.accounts
            .login_password("ada@example.com", PASSWORD, None, None, &meta)
            .await
            .unwrap(),
    );

    let mut forged = pair.access_token.clone();
    forged.pop();
    forged.push(if pair.access_token.ends_with('A') { 'B' } else { 'A' });
    assert!(h.tokens.verify(&forged).is_err());
}

#[tokio::test]
async fn repeated_failures_trip_the_rate_limit() {
    let h = harness().await;
    let meta = RequestMeta::default();
    h.accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();

    let mut limited = false;
    for _ in 0..=LOGIN_ATTEMPT_LIMIT {
        match h
            .accounts
            .login_password("ada@example.com", "wrong", None, None, &meta)
            .await
        {
            Err(AuthError::RateLimited) => {
                limited = true;
                break;
            }
            Err(AuthError::Unauthorized) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert!(limited);
}

#[tokio::test]
async fn two_factor_challenge_and_code_login() {
    let h = harness().await;
    let meta = RequestMeta::default();
    let user = h
        .accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();

    let secret = zkvault_crypto::totp::generate_secret().unwrap();
    let now = chrono::Utc::now().timestamp();
    let code = zkvault_crypto::totp::current_code(&secret, now).unwrap();
    h.accounts
        .enable_two_factor(&user.id, &secret, &code)
        .await
        .unwrap();

    // Password alone gets a challenge, not tokens.
    let outcome = h
        .accounts
        .login_password("ada@example.com", PASSWORD, None, None, &meta)
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::TwoFactorRequired));

    let code = zkvault_crypto::totp::current_code(&secret, chrono::Utc::now().timestamp()).unwrap();
    let outcome = h
        .accounts
        .login_password("ada@example.com", PASSWORD, Some(&code), None, &meta)
        .await
        .unwrap();
    expect_success(outcome);
}

#[tokio::test]
async fn change_password_revokes_sessions() {
    let h = harness().await;
    let meta = RequestMeta::default();
    let user = h
        .accounts
        .register("ada@example.com", None, PASSWORD, &meta)
        .await
        .unwrap();
    let pair = expect_success(
        h.accounts
            .login_password("ada@example.com", PASSWORD, None, None, &meta)
            .await
            .unwrap(),
    );

    let new_password = "an even longer passphrase";
    h.accounts
        .change_password(&user.id, PASSWORD, new_password, &meta)
        .await
        .unwrap();

    assert!(h.tokens.refresh(&pair.refresh_token).await.is_err());
    expect_success(
        h.accounts
            .login_password("ada@example.com", new_password, None, None, &meta)
            .await
            .unwrap(),
    );
}
