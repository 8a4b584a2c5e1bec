//! CLI entry point for zkvault.
//!
//! This binary provides the `zkvault` command with subcommands for running
//! the server and inspecting a database.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use zkvault_server::{ApiServer, ServerConfig};
use zkvault_store::Database;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// zkvault — a zero-knowledge credential vault server.
#[derive(Parser)]
#[command(
    name = "zkvault",
    version,
    about = "zkvault — zero-knowledge credential vault server",
    long_about = "A credential vault server that stores only ciphertext: clients derive \
                  keys locally and the server never sees a password, a key, or a secret."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server.
    Serve {
        /// Bind address. Overrides ZKVAULT_BIND_ADDR.
        #[arg(long)]
        bind: Option<String>,

        /// Port. Overrides ZKVAULT_PORT.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show database status: schema version and row counts.
    Status,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading any configuration.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(bind, port).await,
        Commands::Status => cmd_status().await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(bind: Option<String>, port: Option<u16>) -> Result<()> {
    init_tracing("info");

    let config = load_config(bind, port)?;
    let db = open_database().await?;

    info!("starting zkvault v{}", env!("CARGO_PKG_VERSION"));

    let server = ApiServer::new(config, db);
    info!(addr = %server.addr(), "listening");
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {e}"))
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status() -> Result<()> {
    init_tracing("warn");

    let db = open_database().await?;

    let (version, users, vaults, items) = db
        .execute(|conn| {
            let version = zkvault_store::migration::current_version(conn)?;
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            let vaults: i64 = conn.query_row("SELECT COUNT(*) FROM vaults", [], |r| r.get(0))?;
            let items: i64 =
                conn.query_row("SELECT COUNT(*) FROM vault_items", [], |r| r.get(0))?;
            Ok((version, users, vaults, items))
        })
        .await?;

    println!("zkvault v{}", env!("CARGO_PKG_VERSION"));
    println!("  schema version: {version}");
    println!("  users:          {users}");
    println!("  vaults:         {vaults}");
    println!("  items:          {items}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn load_config(bind: Option<String>, port: Option<u16>) -> Result<ServerConfig> {
    let jwt_secret = std::env::var("ZKVAULT_JWT_SECRET")
        .context("ZKVAULT_JWT_SECRET must be set to a strong random value")?;
    if jwt_secret.len() < 32 {
        bail!("ZKVAULT_JWT_SECRET must be at least 32 bytes");
    }

    let catalog_api_key = std::env::var("ZKVAULT_CATALOG_API_KEY").unwrap_or_default();
    if catalog_api_key.is_empty() {
        tracing::warn!("ZKVAULT_CATALOG_API_KEY is not set; the plan catalogue endpoint is disabled");
    }

    let defaults = ServerConfig::default();
    Ok(ServerConfig {
        bind_addr: bind
            .or_else(|| std::env::var("ZKVAULT_BIND_ADDR").ok())
            .unwrap_or(defaults.bind_addr),
        port: match port {
            Some(p) => p,
            None => match std::env::var("ZKVAULT_PORT") {
                Ok(v) => v.parse().context("ZKVAULT_PORT must be a port number")?,
                Err(_) => defaults.port,
            },
        },
        jwt_secret,
        catalog_api_key,
        access_ttl_secs: env_i64("ZKVAULT_ACCESS_TTL_SECS", defaults.access_ttl_secs)?,
        refresh_ttl_secs: env_i64("ZKVAULT_REFRESH_TTL_SECS", defaults.refresh_ttl_secs)?,
    })
}

fn env_i64(name: &str, default: i64) -> Result<i64> {
    match std::env::var(name) {
        Ok(v) => v.parse().with_context(|| format!("{name} must be an integer")),
        Err(_) => Ok(default),
    }
}

async fn open_database() -> Result<Database> {
    let db_path = std::env::var("ZKVAULT_DB_PATH").unwrap_or_else(|_| "data/zkvault.db".into());

    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }

    let db = Database::open_and_migrate(db_path.clone())
        .await
        .context("failed to open database")?;
    info!(path = %db_path, "store initialized");
    Ok(db)
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
