//! Application error model with HTTP response mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error
//! handling, and maps each variant to the appropriate HTTP status code and a
//! structured JSON body at the response boundary.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers all error cases the gateway may encounter. Each variant maps to an
/// HTTP status code in [`AppError::status_code`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request, bad state)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (message, label, attachment path)
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing, unknown, or expired session token
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Upstream mail provider failure (any non-success provider response)
    #[error("provider error: {0}")]
    Provider(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Short machine-readable code included in error bodies
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Provider(_) => "provider_error",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → 400
    /// - `NotFound` → 404
    /// - `Unauthenticated` → 401
    /// - `Provider` → 502
    /// - `Internal` → 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Provider(format!("provider request timed out: {err}"))
        } else {
            Self::Provider(format!("provider request failed: {err}"))
        }
    }
}

/// Render the error as a structured JSON response
///
/// All handlers return `AppResult<T>`; this is the single place an internal
/// error becomes a caller-visible message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code(), "detail": self.to_string() }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::AppError;

    #[test]
    fn maps_variants_to_status_codes() {
        assert_eq!(
            AppError::invalid("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("gone".to_owned()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthenticated("no token".to_owned()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Provider("rate limited".to_owned()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Internal("boom".to_owned()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = AppError::Unauthenticated("session expired".to_owned());
        assert_eq!(err.to_string(), "unauthenticated: session expired");
    }
}
