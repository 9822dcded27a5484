//! Typed error types for the Quiver remote interpreter boundary.
//!
//! Provides [`RemoteError`] — the canonical error type returned by
//! `RemoteInterpreter` implementations. The pipeline itself never retries
//! a failed call; [`RemoteError::retryable`] exists so callers layering
//! their own policy can tell a transient transport failure from a script
//! the instance has definitively rejected.

use thiserror::Error;

/// Canonical error type for remote script interpreter operations.
///
/// All variants are `#[non_exhaustive]` to allow future additions without
/// breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// The instance could not be reached at all.
    #[error("instance unreachable: {message}")]
    Unreachable {
        /// Transport-level detail (connection refused, DNS, TLS).
        message: String,
    },

    /// The call exceeded its deadline.
    #[error("timeout after {timeout_ms}ms waiting for the instance")]
    Timeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The instance rejected the credentials.
    #[error("authentication rejected by the instance (HTTP {status})")]
    Auth {
        /// The HTTP status the instance answered with.
        status: u16,
    },

    /// The instance accepted the request but the script run failed.
    ///
    /// The message is the interpreter's own diagnostic, passed through
    /// verbatim — this crate does not interpret or classify it further.
    #[error("script execution failed: {message}")]
    Execution {
        /// The interpreter's failure message, verbatim.
        message: String,
    },

    /// The instance answered with a body this client does not understand.
    #[error("malformed response from the instance: {message}")]
    InvalidResponse {
        /// What was wrong with the body.
        message: String,
    },

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RemoteError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "UNREACHABLE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Auth { .. } => "AUTH_REJECTED",
            Self::Execution { .. } => "EXECUTION_FAILED",
            Self::InvalidResponse { .. } => "INVALID_RESPONSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Returns whether the operation that produced this error may succeed
    /// if resubmitted. Informational only — nothing in this workspace
    /// retries on its own.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::Timeout { .. } => true,
            Self::Auth { .. } => false,
            Self::Execution { .. } => false,
            Self::InvalidResponse { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Convert to a structured JSON error response for protocol callers.
    ///
    /// Returns a JSON object with `error`, `code`, `message`, and
    /// `retryable` members.
    pub fn to_structured_error(&self) -> serde_json::Value {
        serde_json::json!({
            "error": true,
            "code": self.code(),
            "message": self.to_string(),
            "retryable": self.retryable(),
        })
    }
}

// Compile-time assertion: RemoteError must be Send + Sync + 'static
const _: fn() = || {
    fn assert_bounds<T: Send + Sync + 'static>() {}
    assert_bounds::<RemoteError>();
};
