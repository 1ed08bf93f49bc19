//! # AppError
//!
//! Centralized error handling for the Basket Talk community.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all bt-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Team, Thread, Post)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty title, post too long)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// No session: the caller must sign in first
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Signed in, but not allowed (e.g., reviewing reports without a moderator role)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Illegal state transition (e.g., acting on a dismissed report)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., store unavailable, CMS timeout)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound(entity.to_string(), id.into())
    }
}

/// Ports speak `anyhow`; an adapter that wants a specific outcome wraps an
/// `AppError`, anything else is infrastructure trouble.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Internal(format!("{other:#}")),
        }
    }
}

/// A specialized Result type for Basket Talk logic.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_keeps_wrapped_app_errors() {
        let wrapped = anyhow::Error::new(AppError::Conflict("report already resolved".into()));
        assert!(matches!(AppError::from(wrapped), AppError::Conflict(_)));

        let io = anyhow::anyhow!("connection reset").context("loading threads");
        match AppError::from(io) {
            AppError::Internal(msg) => assert_eq!(msg, "loading threads: connection reset"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
