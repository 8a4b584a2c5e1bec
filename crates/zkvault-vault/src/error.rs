//! Error types for the zkvault-vault crate.

use thiserror::Error;
use zkvault_store::StoreError;

/// Alias for `Result<T, VaultError>`.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors surfaced by vault, sync and organization operations.
///
/// A resource the caller may not access reports as `NotFound`, same as one
/// that does not exist; `Forbidden` is reserved for resources the caller can
/// see but not mutate (an org vault a plain member tries to rename, a role
/// change a member attempts).
#[derive(Debug, Error)]
pub enum VaultError {
    /// The resource does not exist or the caller cannot see it.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Visible but not mutable by this caller.
    #[error("forbidden")]
    Forbidden,

    /// The operation conflicts with current state (caps exceeded, duplicate
    /// invitation, invalid status transition, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed or unacceptable input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => VaultError::NotFound { entity, id },
            StoreError::Conflict(msg) => VaultError::Conflict(msg),
            StoreError::InvalidArgument(msg) => VaultError::InvalidRequest(msg),
            other => VaultError::Store(other),
        }
    }
}
