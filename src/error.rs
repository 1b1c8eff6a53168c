use chrono::{DateTime, Utc};
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
///
/// Only [`Error::Transient`] is safe to retry. Every other kind is a definite
/// answer that the boundary layer translates into a user-facing response.
#[derive(Debug, Error)]
pub enum Error {
    /// A role, user or token does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    /// A verification token exists but is past its expiry.
    #[error("verification token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    /// A uniqueness constraint could not be satisfied.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Malformed input such as a permission spec or identifier.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Startup configuration is unusable (for example a missing signing secret).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Store, cache or notifier unreachable or timed out.
    #[error("transient failure during {operation}: {source}")]
    Transient {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub(crate) fn transient(operation: &'static str, source: StoreError) -> Self {
        Self::Transient { operation, source }
    }

    /// Returns whether the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
