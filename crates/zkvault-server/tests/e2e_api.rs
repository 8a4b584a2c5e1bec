//! End-to-end tests for the HTTP API.
//!
//! These tests spin up the **real** Axum router on an OS-assigned ephemeral
//! port over an in-memory database, make actual HTTP requests via `reqwest`,
//! and verify the full request/response cycle including JSON parsing.

use std::net::SocketAddr;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use zkvault_server::{ApiServer, ServerConfig};
use zkvault_store::Database;

const PASSWORD: &str = "correct horse battery staple";
const CATALOG_KEY: &str = "app-identity-key";

// ── helpers ──────────────────────────────────────────────────────────────────

/// Bind to 127.0.0.1:0, start the full router, return (base_url, server task).
async fn start_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let db = Database::open_in_memory().expect("open db");
    db.run_migrations().await.expect("migrate");

    let config = ServerConfig {
        jwt_secret: "e2e-test-secret-at-least-32-bytes!!".into(),
        catalog_api_key: CATALOG_KEY.into(),
        ..ServerConfig::default()
    };
    let app = ApiServer::new(config, db).router();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to port 0");
    let addr: SocketAddr = listener.local_addr().expect("get local addr");
    let base = format!("http://127.0.0.1:{}", addr.port());

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    // Small yield so the listener is ready.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    (base, handle)
}

async fn register(client: &reqwest::Client, base: &str, email: &str) {
    let resp = client
        .post(format!("{base}/api/accounts/register"))
        .json(&json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 201);
}

/// Password-grant login, returning the parsed response body.
async fn login(client: &reqwest::Client, base: &str, email: &str) -> Value {
    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({
            "email": email,
            "password": PASSWORD,
            "device": { "name": "e2e", "deviceType": "cli" },
        }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("invalid JSON")
}

// ── account lifecycle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn register_initialize_and_lookup_flow() {
    let (base, _srv) = start_test_server().await;
    let client = reqwest::Client::new();

    // Unknown address resolves to register with the default KDF.
    let lookup: Value = client
        .post(format!("{base}/api/accounts/lookup"))
        .json(&json!({ "email": "ada@example.com" }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");
    assert_eq!(lookup["exists"], false);
    assert_eq!(lookup["loginMethod"], "register");
    assert_eq!(lookup["kdfIterations"], 600_000);

    register(&client, &base, "ada@example.com").await;

    let lookup: Value = client
        .post(format!("{base}/api/accounts/lookup"))
        .json(&json!({ "email": "ada@example.com" }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");
    assert_eq!(lookup["exists"], true);
    assert_eq!(lookup["loginMethod"], "password_login");

    // Initialize the key hierarchy with the interim password-login token.
    let session = login(&client, &base, "ada@example.com").await;
    let access = session["accessToken"].as_str().expect("access token");

    let resp = client
        .post(format!("{base}/api/accounts/keys"))
        .bearer_auth(access)
        .json(&json!({
            "publicKey": "b64:public",
            "encryptedPrivateKey": "b64:nonce:b64:private",
            "protectedSymmetricKey": "b64:nonce:b64:sym",
            "masterPasswordHash": "b64:master-password-hash",
            "kdfType": 1,
            "kdfIterations": 3,
            "kdfMemory": 64,
            "kdfParallelism": 4,
        }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);

    // Lookup now advertises zk_login with the initialization KDF params.
    let lookup: Value = client
        .post(format!("{base}/api/accounts/lookup"))
        .json(&json!({ "email": "ada@example.com" }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");
    assert_eq!(lookup["loginMethod"], "zk_login");
    assert_eq!(lookup["kdfType"], 1);
    assert_eq!(lookup["kdfMemory"], 64);
}

#[tokio::test]
async fn login_and_sync_returns_default_vault() {
    let (base, _srv) = start_test_server().await;
    let client = reqwest::Client::new();

    register(&client, &base, "ada@example.com").await;
    let session = login(&client, &base, "ada@example.com").await;
    assert_eq!(session["requires2FA"], false);
    assert_eq!(session["tokenType"], "Bearer");
    let access = session["accessToken"].as_str().expect("access token");

    let sync: Value = client
        .get(format!("{base}/api/sync"))
        .bearer_auth(access)
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid JSON");

    assert_eq!(sync["profile"]["email"], "ada@example.com");
    let vaults = sync["vaults"].as_array().expect("vaults array");
    assert_eq!(vaults.len(), 1);
    assert_eq!(vaults[0]["isDefault"], true);
    assert!(sync["serverTime"].is_i64(), "serverTime must be a timestamp");
    assert!(
        sync["profile"].get("masterPasswordHash").is_none(),
        "server-side hash must never appear on the wire"
    );
}

#[tokio::test]
async fn refresh_token_is_single_use_over_http() {
    let (base, _srv) = start_test_server().await;
    let client = reqwest::Client::new();

    register(&client, &base, "ada@example.com").await;
    let session = login(&client, &base, "ada@example.com").await;
    let refresh = session["refreshToken"].as_str().expect("refresh token");

    let resp = client
        .post(format!("{base}/api/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);
    let rotated: Value = resp.json().await.expect("invalid JSON");
    assert_ne!(rotated["refreshToken"].as_str(), Some(refresh));

    // Replaying the consumed token fails.
    let resp = client
        .post(format!("{base}/api/auth/refresh"))
        .json(&json!({ "refreshToken": refresh }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 401);
}

// ── error shape and guards ───────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_sync_is_401_with_error_body() {
    let (base, _srv) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/sync"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 401);

    let body: Value = resp.json().await.expect("invalid JSON");
    assert_eq!(body["error"], "unauthorized");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn catalog_requires_the_app_identity_key() {
    let (base, _srv) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/catalog/plans"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{base}/api/catalog/plans"))
        .header("x-api-key", "wrong")
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{base}/api/catalog/plans"))
        .header("x-api-key", CATALOG_KEY)
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 200);
    let plans: Value = resp.json().await.expect("invalid JSON");
    let plans = plans.as_array().expect("plans array");
    assert_eq!(plans.len(), 3);
    assert!(plans.iter().any(|p| p["plan"] == "team"));
}

#[tokio::test]
async fn unconfigured_catalog_key_disables_the_endpoint() {
    let db = Database::open_in_memory().expect("open db");
    db.run_migrations().await.expect("migrate");
    let config = ServerConfig {
        jwt_secret: "e2e-test-secret-at-least-32-bytes!!".into(),
        ..ServerConfig::default()
    };
    let app = ApiServer::new(config, db).router();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to port 0");
    let base = format!("http://127.0.0.1:{}", listener.local_addr().expect("local addr").port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // An empty presented key must not match the empty configuration.
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/api/catalog/plans"))
        .header("x-api-key", "")
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 401);
}
