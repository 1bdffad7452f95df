//! Error types for NullVoid

use std::path::PathBuf;

use thiserror::Error;

/// Convenience Result type for NullVoid operations
pub type Result<T> = std::result::Result<T, NullVoidError>;

#[derive(Error, Debug)]
pub enum NullVoidError {
    /// Caller-visible input validation failure. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A path escaped its base directory or contained traversal tokens.
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Shell metacharacters or injection tokens in an input path.
    #[error("Command injection attempt: {0}")]
    CommandInjection(String),

    /// File-level failure. Recorded as an `AnalysisError` threat, scan continues.
    #[error("File error at {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rate limit reached for an identifier; retry after the blocked instant.
    #[error("Rate limited: {identifier} blocked for {retry_after_ms}ms")]
    RateLimit {
        identifier: String,
        retry_after_ms: u64,
    },

    /// Non-fatal at chunk level, fatal at scan level.
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Fatal, non-retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local recovery: invalidate the entry and continue without caching.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Hardening-check violation. Recorded as a threat, non-fatal.
    #[error("Sandbox violation: {0}")]
    Sandbox(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl NullVoidError {
    /// Whether the throttler may retry the failed operation.
    ///
    /// Validation, configuration and injection failures are caller bugs or
    /// attacks; retrying cannot change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_)
                | Self::Configuration(_)
                | Self::PathTraversal(_)
                | Self::CommandInjection(_)
        )
    }

    /// Shorthand for a file error with its offending path.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_not_retryable() {
        assert!(!NullVoidError::Validation("bad input".into()).is_retryable());
        assert!(!NullVoidError::Configuration("bad config".into()).is_retryable());
        assert!(!NullVoidError::PathTraversal("../etc".into()).is_retryable());
    }

    #[test]
    fn test_transient_errors_retryable() {
        assert!(NullVoidError::Timeout(30_000).is_retryable());
        assert!(
            NullVoidError::RateLimit {
                identifier: "osv".into(),
                retry_after_ms: 500,
            }
            .is_retryable()
        );
        assert!(NullVoidError::Cache("corrupt entry".into()).is_retryable());
    }

    #[test]
    fn test_file_error_carries_path() {
        let err = NullVoidError::file(
            "/tmp/pkg/index.js",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/pkg/index.js"));
    }
}
