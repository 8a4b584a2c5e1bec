//! The HTTP error surface.
//!
//! Every handler returns [`ApiError`] on failure; the `IntoResponse` impl
//! maps it to a status code and a `{error, message}` JSON body. Internal
//! causes are logged here and never serialized into the response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use zkvault_auth::AuthError;
use zkvault_vault::VaultError;

/// Alias for handler results.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors crossing the HTTP boundary.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound,
    Forbidden,
    Conflict(String),
    RateLimited,
    BadRequest(String),
    Internal,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "authentication required or credentials invalid".into(),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "the requested resource does not exist".into(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "the caller may not perform this operation".into(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "too many attempts, retry later".into(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "internal server error".into(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => ApiError::Unauthorized,
            AuthError::RateLimited => ApiError::RateLimited,
            AuthError::Conflict(msg) => ApiError::Conflict(msg),
            AuthError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            AuthError::Store(e) => {
                tracing::error!(error = %e, "store failure");
                ApiError::Internal
            }
            AuthError::Crypto(e) => {
                tracing::error!(error = %e, "crypto failure");
                ApiError::Internal
            }
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        match err {
            // Absent and inaccessible are already conflated upstream.
            VaultError::NotFound { .. } => ApiError::NotFound,
            VaultError::Forbidden => ApiError::Forbidden,
            VaultError::Conflict(msg) => ApiError::Conflict(msg),
            VaultError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            VaultError::Store(e) => {
                tracing::error!(error = %e, "store failure");
                ApiError::Internal
            }
        }
    }
}

// ── tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ApiError::Unauthorized.parts().0, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound.parts().0, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Forbidden.parts().0, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Conflict("x".into()).parts().0, StatusCode::CONFLICT);
        assert_eq!(ApiError::RateLimited.parts().0, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::BadRequest("x".into()).parts().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_message_hides_the_cause() {
        let err: ApiError = AuthError::Store(zkvault_store::StoreError::TaskJoin(
            "worker panicked: secret detail".into(),
        ))
        .into();
        let (_, _, message) = err.parts();
        assert!(!message.contains("secret"));
    }
}
