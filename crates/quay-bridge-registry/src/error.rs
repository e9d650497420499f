//! Registry client errors

use thiserror::Error;

/// Failures talking to the registry.
///
/// An unexpected status is not produced by the client itself; callers build
/// it when a response does not carry the status they require.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Connection, TLS, or protocol failure
    #[error("{operation} failed: {message}")]
    Transport {
        /// Registry operation being performed
        operation: String,
        /// Underlying error text
        message: String,
    },

    /// Success response whose body could not be decoded
    #[error("{operation} returned an undecodable body: {message}")]
    Decode {
        /// Registry operation being performed
        operation: String,
        /// Underlying error text
        message: String,
    },

    /// Registry base URL or endpoint path could not be built
    #[error("invalid registry URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        message: String,
    },

    /// Response status differs from what the operation requires
    #[error("{operation} returned HTTP {status}, expected {expected}")]
    UnexpectedStatus {
        /// Registry operation being performed
        operation: String,
        /// Status received
        status: u16,
        /// Status required
        expected: u16,
    },
}

impl RegistryError {
    /// Build an unexpected-status error
    pub fn unexpected_status(operation: impl Into<String>, status: u16, expected: u16) -> Self {
        Self::UnexpectedStatus {
            operation: operation.into(),
            status,
            expected,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_status_message() {
        let err = RegistryError::unexpected_status("create organization", 500, 201);
        assert_eq!(
            err.to_string(),
            "create organization returned HTTP 500, expected 201"
        );
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn transport_has_no_status() {
        let err = RegistryError::Transport {
            operation: "get organization".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("connection refused"));
    }
}
