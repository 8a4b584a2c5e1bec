//! Password key derivation and credential hashing.
//!
//! Two distinct derivations live here:
//!
//! - **Client side** (pure functions, also used by tests and tooling):
//!   [`derive_master_key`] turns `(password, email)` into the 256-bit master
//!   key using the account's published KDF parameters, and
//!   [`master_password_hash`] produces the only credential that is ever
//!   transmitted — a single cheap PBKDF2 round keyed by the master key.
//! - **Server side**: [`hash_server`] / [`verify_server`] re-hash the
//!   transmitted credential with a random per-user salt and 600,000 PBKDF2
//!   iterations before storage, so a stolen database row is not directly
//!   usable as a login credential.
//!
//! The server never sees the password or the master key.

use std::num::NonZeroU32;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};

/// Length of the derived master key in bytes (256 bits).
pub const MASTER_KEY_LEN: usize = 32;

/// Server-side storage hash salt length in bytes.
pub const SERVER_SALT_LEN: usize = 32;

/// Server-side PBKDF2 iteration count — 600,000 per OWASP 2023 recommendation
/// for HMAC-SHA256.
pub const SERVER_ITERATIONS: u32 = 600_000;

/// Default client iteration count for PBKDF2 accounts.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Default Argon2id parameters: 3 passes over 64 MiB with 4 lanes.
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 3;
pub const DEFAULT_ARGON2_MEMORY_MIB: u32 = 64;
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 4;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// The key-derivation algorithm published for an account.
///
/// Wire values match the integers stored per user: 0 = PBKDF2-SHA256,
/// 1 = Argon2id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum KdfType {
    Pbkdf2Sha256,
    Argon2id,
}

impl From<KdfType> for i32 {
    fn from(k: KdfType) -> i32 {
        match k {
            KdfType::Pbkdf2Sha256 => 0,
            KdfType::Argon2id => 1,
        }
    }
}

impl TryFrom<i32> for KdfType {
    type Error = String;

    fn try_from(v: i32) -> std::result::Result<Self, String> {
        match v {
            0 => Ok(Self::Pbkdf2Sha256),
            1 => Ok(Self::Argon2id),
            other => Err(format!("unknown kdf type: {other}")),
        }
    }
}

/// Cost parameters for an account's key derivation.
///
/// These are server-published and rotatable per account; clients must never
/// substitute hard-coded defaults for values the server handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub kdf_type: KdfType,
    /// PBKDF2 iteration count, or Argon2id pass count.
    pub iterations: u32,
    /// Argon2id memory cost in MiB; unused for PBKDF2.
    pub memory_mib: u32,
    /// Argon2id lane count; unused for PBKDF2.
    pub parallelism: u32,
}

impl KdfParams {
    /// Default PBKDF2-SHA256 parameters for newly initialized accounts.
    pub fn pbkdf2_default() -> Self {
        Self {
            kdf_type: KdfType::Pbkdf2Sha256,
            iterations: DEFAULT_PBKDF2_ITERATIONS,
            memory_mib: 0,
            parallelism: 0,
        }
    }

    /// Default Argon2id parameters.
    pub fn argon2_default() -> Self {
        Self {
            kdf_type: KdfType::Argon2id,
            iterations: DEFAULT_ARGON2_ITERATIONS,
            memory_mib: DEFAULT_ARGON2_MEMORY_MIB,
            parallelism: DEFAULT_ARGON2_PARALLELISM,
        }
    }
}

/// Derive the 256-bit master key from `(password, email)`.
///
/// The lower-cased email is the salt, which ties the key to the account and
/// makes precomputation across accounts useless. Pure function: no I/O, no
/// randomness.
///
/// # Errors
///
/// Returns [`CryptoError::UnsupportedKdf`] when the cost parameters are
/// unusable (zero iterations, zero memory, zero lanes).
pub fn derive_master_key(
    password: &str,
    email: &str,
    params: &KdfParams,
) -> Result<[u8; MASTER_KEY_LEN]> {
    let salt = email.trim().to_lowercase();
    let mut key = [0u8; MASTER_KEY_LEN];

    match params.kdf_type {
        KdfType::Pbkdf2Sha256 => {
            let iterations = NonZeroU32::new(params.iterations)
                .ok_or_else(|| CryptoError::UnsupportedKdf("pbkdf2 iterations must be > 0".into()))?;
            pbkdf2::derive(
                PBKDF2_ALG,
                iterations,
                salt.as_bytes(),
                password.as_bytes(),
                &mut key,
            );
        }
        KdfType::Argon2id => {
            let memory_kib = params
                .memory_mib
                .checked_mul(1024)
                .filter(|m| *m > 0)
                .ok_or_else(|| CryptoError::UnsupportedKdf("argon2 memory must be > 0".into()))?;
            if params.iterations == 0 || params.parallelism == 0 {
                return Err(CryptoError::UnsupportedKdf(
                    "argon2 iterations and parallelism must be > 0".into(),
                ));
            }
            let argon_params = Params::new(
                memory_kib,
                params.iterations,
                params.parallelism,
                Some(MASTER_KEY_LEN),
            )
            .map_err(|e| CryptoError::UnsupportedKdf(e.to_string()))?;
            let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
            argon
                .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
                .map_err(|e| CryptoError::UnsupportedKdf(e.to_string()))?;
        }
    }

    Ok(key)
}

/// Derive the transmitted credential from the master key.
///
/// A single PBKDF2-SHA256 round keyed by the master key with the raw
/// password as salt. Cheap on purpose — the expensive work already happened
/// in [`derive_master_key`] — and irreversible back to the master key.
pub fn master_password_hash(master_key: &[u8; MASTER_KEY_LEN], password: &str) -> String {
    let mut out = [0u8; MASTER_KEY_LEN];
    let one = NonZeroU32::new(1).expect("1 is non-zero");
    pbkdf2::derive(PBKDF2_ALG, one, password.as_bytes(), master_key, &mut out);
    BASE64.encode(out)
}

/// Hash a transmitted credential for storage.
///
/// Returns `base64(salt):base64(hash)` with a random 32-byte salt and
/// 600,000 PBKDF2-SHA256 iterations.
pub fn hash_server(secret: &str) -> Result<String> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; SERVER_SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| CryptoError::OperationFailed("failed to generate random salt"))?;

    let mut hash = [0u8; MASTER_KEY_LEN];
    let iterations = NonZeroU32::new(SERVER_ITERATIONS).expect("SERVER_ITERATIONS is non-zero");
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, secret.as_bytes(), &mut hash);

    Ok(format!("{}:{}", BASE64.encode(salt), BASE64.encode(hash)))
}

/// Verify a transmitted credential against a stored `salt:hash` string.
///
/// Comparison is constant-time via `ring::pbkdf2::verify`.
pub fn verify_server(secret: &str, stored: &str) -> Result<bool> {
    let (salt_b64, hash_b64) = stored
        .split_once(':')
        .ok_or_else(|| CryptoError::MalformedEncoding("missing salt separator".into()))?;

    let salt = BASE64
        .decode(salt_b64)
        .map_err(|e| CryptoError::MalformedEncoding(format!("invalid salt: {e}")))?;
    let expected = BASE64
        .decode(hash_b64)
        .map_err(|e| CryptoError::MalformedEncoding(format!("invalid hash: {e}")))?;

    let iterations = NonZeroU32::new(SERVER_ITERATIONS).expect("SERVER_ITERATIONS is non-zero");
    Ok(pbkdf2::verify(PBKDF2_ALG, iterations, &salt, secret.as_bytes(), &expected).is_ok())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // Small parameters so tests stay fast; production defaults are exercised
    // only through the constants.
    fn fast_pbkdf2() -> KdfParams {
        KdfParams {
            kdf_type: KdfType::Pbkdf2Sha256,
            iterations: 1_000,
            memory_mib: 0,
            parallelism: 0,
        }
    }

    fn fast_argon2() -> KdfParams {
        KdfParams {
            kdf_type: KdfType::Argon2id,
            iterations: 1,
            memory_mib: 8,
            parallelism: 1,
        }
    }

    #[test]
    fn master_key_is_deterministic() {
        let params = fast_pbkdf2();
        let a = derive_master_key("hunter2", "User@Example.com", &params).unwrap();
        let b = derive_master_key("hunter2", "user@example.com", &params).unwrap();
        // Email case must not matter: the salt is the lower-cased email.
        assert_eq!(a, b);

        let c = derive_master_key("hunter2", "other@example.com", &params).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn argon2_derivation_works() {
        let params = fast_argon2();
        let a = derive_master_key("hunter2", "user@example.com", &params).unwrap();
        let b = derive_master_key("hunter3", "user@example.com", &params).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn zero_cost_parameters_are_rejected() {
        let mut params = fast_pbkdf2();
        params.iterations = 0;
        assert!(matches!(
            derive_master_key("pw", "a@b.c", &params),
            Err(CryptoError::UnsupportedKdf(_))
        ));

        let mut params = fast_argon2();
        params.memory_mib = 0;
        assert!(matches!(
            derive_master_key("pw", "a@b.c", &params),
            Err(CryptoError::UnsupportedKdf(_))
        ));
    }

    #[test]
    fn master_password_hash_differs_from_key() {
        let params = fast_pbkdf2();
        let key = derive_master_key("hunter2", "user@example.com", &params).unwrap();
        let mph = master_password_hash(&key, "hunter2");
        assert_ne!(mph, BASE64.encode(key));
    }

    #[test]
    fn server_hash_roundtrip() {
        let stored = hash_server("some-transmitted-hash").unwrap();
        assert!(verify_server("some-transmitted-hash", &stored).unwrap());
        assert!(!verify_server("wrong", &stored).unwrap());
    }

    #[test]
    fn server_hash_is_salted() {
        let a = hash_server("same-secret").unwrap();
        let b = hash_server("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        assert!(verify_server("x", "no-separator-here").is_err());
        assert!(verify_server("x", "!!!:???").is_err());
    }
}
