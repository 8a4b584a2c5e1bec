//! Error types for the zkvault-crypto crate.

use thiserror::Error;

/// Alias for `Result<T, CryptoError>`.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The KDF type or its cost parameters are not usable.
    ///
    /// Clients must treat this as fatal: parameters come from the server and
    /// are rotatable per account, so a value this library cannot honor means
    /// the client and server disagree about the account's key derivation.
    #[error("unsupported kdf: {0}")]
    UnsupportedKdf(String),

    /// Random generation, sealing, or signing failed inside `ring`.
    #[error("crypto operation failed: {0}")]
    OperationFailed(&'static str),

    /// Authenticated decryption failed (wrong key or tampered ciphertext).
    #[error("decryption failed")]
    DecryptionFailed,

    /// A compact token was malformed or its signature did not verify.
    #[error("invalid token")]
    InvalidToken,

    /// A stored hash or key string could not be decoded.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// JSON serialization of token claims failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
