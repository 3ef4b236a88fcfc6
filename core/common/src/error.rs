//! Common error types for ImageHost.

use thiserror::Error;

/// Top-level error type for ImageHost operations.
///
/// Variants raised by a storage backend carry the backend's display name so
/// that every rendered message says which provider failed.
#[derive(Debug, Error)]
pub enum Error {
    /// Required credential fields are missing. Never reaches the network.
    #[error("{provider}: configuration incomplete: {message}")]
    Config { provider: String, message: String },

    /// The active provider has no usable credentials.
    #[error("{provider} is not configured")]
    NotConfigured { provider: String },

    /// Token rejected by the backend (401).
    #[error("{provider}: authentication failed: {message}")]
    Authentication { provider: String, message: String },

    /// Token lacks the required permission (403).
    #[error("{provider}: permission denied: {message}")]
    PermissionDenied { provider: String, message: String },

    /// Repository, folder or path missing (404).
    #[error("{provider}: not found: {message}")]
    NotFound { provider: String, message: String },

    /// Path already exists or is invalid (422).
    #[error("{provider}: conflict: {message}")]
    Conflict { provider: String, message: String },

    /// Any other non-success response.
    #[error("{provider}: upload failed: {message}")]
    Upload { provider: String, message: String },

    /// Transport failed before a response was received.
    #[error("{provider}: network error: {message}")]
    Network { provider: String, message: String },

    /// File type cannot be hosted.
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    /// File exceeds the provider's size limit.
    #[error("File too large ({size} bytes), {provider} accepts at most {limit} bytes")]
    FileTooLarge {
        provider: String,
        size: u64,
        limit: u64,
    },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Display name of the provider the error originated from, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Error::Config { provider, .. }
            | Error::NotConfigured { provider }
            | Error::Authentication { provider, .. }
            | Error::PermissionDenied { provider, .. }
            | Error::NotFound { provider, .. }
            | Error::Conflict { provider, .. }
            | Error::Upload { provider, .. }
            | Error::Network { provider, .. }
            | Error::FileTooLarge { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Whether the user has to act on configuration rather than retry.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::NotConfigured { .. })
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_in_message() {
        let err = Error::NotFound {
            provider: "GitHub".to_string(),
            message: "repository u/r does not exist".to_string(),
        };
        assert_eq!(err.provider(), Some("GitHub"));
        assert!(err.to_string().contains("GitHub"));
        assert!(err.to_string().contains("u/r"));
    }

    #[test]
    fn test_not_configured_is_configuration() {
        let err = Error::NotConfigured {
            provider: "Dropbox".to_string(),
        };
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Dropbox is not configured");

        let err = Error::Network {
            provider: "Dropbox".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_io_conversion_has_no_provider() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(err.provider().is_none());
    }
}
