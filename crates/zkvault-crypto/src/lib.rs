//! Cryptographic core for zkvault.
//!
//! The server holds only ciphertext and values it cannot decrypt; everything
//! that touches key material lives in this crate:
//!
//! - [`kdf`] — master-key derivation (PBKDF2-SHA256 / Argon2id), the
//!   transmitted master-password hash, and the server-side storage hash.
//! - [`seal`] — AES-256-GCM key wrapping, random generation, opaque tokens.
//! - [`jwt`] — HS256 compact tokens for stateless access credentials.
//! - [`totp`] — RFC 6238 second-factor codes.
//! - [`error`] — unified error type.
//!
//! All functions are pure or draw only from the system RNG; nothing here
//! performs I/O.

pub mod error;
pub mod jwt;
pub mod kdf;
pub mod seal;
pub mod totp;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{CryptoError, Result};
pub use kdf::{KdfParams, KdfType, derive_master_key, hash_server, master_password_hash, verify_server};
pub use seal::{generate_symmetric_key, open, random_bytes, random_token, seal};
