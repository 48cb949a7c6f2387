//! Error types for pool arithmetic, allocation and admission

use crate::validation::FieldErrors;
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// IP pool manager errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    // Address arithmetic errors
    #[error("invalid format '{text}': {reason}")]
    InvalidFormat { text: String, reason: String },

    #[error("IP range {range} is not within base network {base}")]
    OutOfBase { range: String, base: String },

    #[error("IP range {first} overlaps with {second}")]
    Overlap { first: String, second: String },

    #[error("IP range {outer} covers {inner}")]
    Covers { outer: String, inner: String },

    // Allocation errors
    #[error("all IP addresses used out in IPPool {pool}: {reason}")]
    IpUsedOut { pool: String, reason: String },

    #[error("failed to update IPPool {pool} after {attempts} attempts: version conflicts")]
    RetriesExhausted { pool: String, attempts: u32 },

    #[error("IP {ip} is not allocated in IPPool {pool}")]
    NotAllocated { pool: String, ip: String },

    #[error("IPPool not found: {0}")]
    PoolNotFound(String),

    #[error("wrong input: {0}")]
    WrongInput(String),

    // Call context
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    // Collaborator errors
    #[error("record store error: {0}")]
    Store(String),

    // Admission errors
    #[error("admission denied: {0}")]
    Admission(FieldErrors),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_format(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidFormat {
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Whether a caller may reasonably retry the whole operation later.
    ///
    /// Exhaustion and malformed input are terminal: retrying a full pool or a
    /// bad range string never succeeds.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RetriesExhausted { .. } | Error::Store(_) | Error::DeadlineExceeded
        )
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::RetriesExhausted {
            pool: "pool-a".to_string(),
            attempts: 5
        }
        .is_retryable());
        assert!(Error::Store("connection reset".to_string()).is_retryable());
        assert!(!Error::IpUsedOut {
            pool: "pool-a".to_string(),
            reason: "no free address".to_string()
        }
        .is_retryable());
        assert!(!Error::invalid_format("10.0.0.x", "bad address").is_retryable());
    }

    #[test]
    fn test_messages_name_conflicting_ranges() {
        let err = Error::Overlap {
            first: "10.0.0.1-10.0.0.10".to_string(),
            second: "10.0.0.5".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.1-10.0.0.10"));
        assert!(msg.contains("10.0.0.5"));
    }
}
