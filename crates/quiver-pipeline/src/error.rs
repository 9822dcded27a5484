//! Error types for the Quiver pipeline.

use thiserror::Error;

/// Errors that can occur while screening, wrapping, or executing a script.
///
/// `ExecutionPipeline::execute` never surfaces these as `Err` — they are
/// converted into a failed `ExecutionReport` so protocol callers always
/// get a result-shaped answer.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The script is empty or whitespace-only.
    #[error("script is empty")]
    EmptyScript,

    /// The script exceeds the configured maximum length.
    #[error("script exceeds maximum length of {max} characters (got {actual})")]
    ScriptTooLarge {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// The security screener rejected the script.
    #[error("security screening failed: {}", violations.join("; "))]
    Unsafe {
        /// All violations, in catalog order.
        violations: Vec<String>,
    },

    /// A catalog override pattern failed to compile.
    #[error("invalid screening pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// The regex compiler's diagnostic.
        reason: String,
    },

    /// The script cannot be wrapped for test mode.
    #[error("test mode cannot wrap this script: {0}")]
    Wrap(#[from] crate::wrap::WrapError),

    /// The remote interpreter failed.
    #[error(transparent)]
    Remote(#[from] quiver_error::RemoteError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_names_both_numbers() {
        let err = PipelineError::ScriptTooLarge {
            max: 10_000,
            actual: 12_345,
        };
        let msg = err.to_string();
        assert!(msg.contains("10000"), "should name the limit: {msg}");
        assert!(msg.contains("12345"), "should name the actual length: {msg}");
    }

    #[test]
    fn unsafe_joins_all_violations() {
        let err = PipelineError::Unsafe {
            violations: vec!["first".into(), "second".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("first") && msg.contains("second"));
    }

    #[test]
    fn remote_is_display_transparent() {
        let err: PipelineError = quiver_error::RemoteError::Timeout { timeout_ms: 100 }.into();
        assert!(err.to_string().contains("timeout after 100ms"));
    }
}
