//! Error types for the netcache node

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache node and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram does not match the fixed message size
    #[error("Malformed {message} datagram: expected {expected} bytes, got {actual}")]
    Format {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rules file could not be read or parsed
    #[error("Failed to load rules file {path}: {reason}")]
    RulesFile { path: String, reason: String },

    /// No response arrived within the bound
    #[error("Timed out after {timeout_ms}ms waiting for key {key}")]
    Timeout { key: u32, timeout_ms: u64 },

    /// Admin interface rejected a request
    #[error("Admin request failed: {0}")]
    Admin(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true for errors that are absorbed at the node boundary
    /// (the offending datagram is dropped and nothing is reported).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Format { .. } | Error::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = Error::Format {
            message: "request",
            expected: 4,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "Malformed request datagram: expected 4 bytes, got 7"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_error_not_recoverable() {
        let err = Error::Config("slots must be a power of two".to_string());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("power of two"));
    }
}
