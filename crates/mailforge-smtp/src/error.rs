//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
///
/// Every error ends the session: the client is consumed and its socket is
/// dropped without `QUIT`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] io::Error),

    /// TCP connection could not be established (includes connect timeout).
    #[error("Could not connect to {address}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// No complete reply arrived within the reply timeout.
    #[error("Timed out after {0:?} waiting for server reply")]
    Timeout(Duration),

    /// Server replied with a code other than the one the dialog expects.
    #[error("Unexpected SMTP response {code}: {message}")]
    UnexpectedResponse {
        /// Reply code (e.g., 550).
        code: u16,
        /// Reply text from server.
        message: String,
    },

    /// Malformed reply or invalid local input.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature not advertised by the server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates an unexpected-response error from a reply code and message.
    #[must_use]
    pub fn unexpected(code: u16, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            code,
            message: message.into(),
        }
    }

    /// Returns the reply code for response errors.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedResponse { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::UnexpectedResponse { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UnexpectedResponse { code, .. } if *code >= 400 && *code < 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_classes() {
        let busy = Error::unexpected(451, "try later");
        assert!(busy.is_transient());
        assert!(!busy.is_permanent());
        assert_eq!(busy.code(), Some(451));

        let rejected = Error::unexpected(550, "no such user");
        assert!(rejected.is_permanent());
        assert_eq!(rejected.to_string(), "Unexpected SMTP response 550: no such user");

        assert_eq!(Error::Timeout(Duration::from_secs(8)).code(), None);
    }
}
