//! Error types for the zkvault-auth crate.

use thiserror::Error;
use zkvault_store::StoreError;

/// Alias for `Result<T, AuthError>`.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by authentication operations.
///
/// `Unauthorized` deliberately carries no detail: invalid, expired and
/// unknown credentials all collapse into it before crossing any boundary,
/// so the error itself cannot be used as an oracle. The internal cause goes
/// to logs at the point of failure.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, invalid, expired or revoked credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Too many attempts against an enumeration-prone endpoint.
    #[error("rate limited")]
    RateLimited,

    /// The operation conflicts with current account state
    /// (duplicate email, keys already initialized, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed or unacceptable input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cryptographic failure.
    #[error(transparent)]
    Crypto(#[from] zkvault_crypto::CryptoError),
}
