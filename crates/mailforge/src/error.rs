//! Error types for message sending.

use mailforge_mime::{AddressError, BodyError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport while handing a message over.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local submission program could not be run or exited with failure.
    #[error("Local submission rejected: {0}")]
    SubmissionRejected(String),

    /// The SMTP server answered with a code the dialog does not allow.
    #[error("Unexpected SMTP response {code}: {message}")]
    UnexpectedResponse {
        /// Reply code (e.g., 550).
        code: u16,
        /// Reply text.
        message: String,
    },

    /// No reply arrived in time.
    #[error("Timed out after {0:?} waiting for server reply")]
    Timeout(Duration),

    /// The server could not be reached or the TLS handshake failed.
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Malformed reply, or a required extension is missing.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether retrying the same message later may succeed: timeouts,
    /// connection failures and 4xx replies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectFailed(_) => true,
            Self::UnexpectedResponse { code, .. } => *code >= 400 && *code < 500,
            Self::SubmissionRejected(_) | Self::Protocol(_) | Self::Io(_) => false,
        }
    }
}

impl From<mailforge_smtp::Error> for TransportError {
    fn from(err: mailforge_smtp::Error) -> Self {
        use mailforge_smtp::Error as SmtpError;

        match err {
            SmtpError::Io(e) => Self::Io(e),
            SmtpError::Tls(_) | SmtpError::Connect { .. } => Self::ConnectFailed(err.to_string()),
            SmtpError::Timeout(after) => Self::Timeout(after),
            SmtpError::UnexpectedResponse { code, message } => {
                Self::UnexpectedResponse { code, message }
            }
            SmtpError::Protocol(_) | SmtpError::NotSupported(_) => Self::Protocol(err.to_string()),
        }
    }
}

/// Errors returned by [`MessageBuilder`](crate::MessageBuilder).
#[derive(Debug, Error)]
pub enum MailerError {
    /// The message was already delivered.
    #[error("Message has already been sent")]
    AlreadySent,

    /// An earlier delivery failed permanently.
    #[error("Message delivery already failed permanently")]
    Failed,

    /// No primary body was set.
    #[error("Message body is empty")]
    EmptyBody,

    /// No From address was set.
    #[error("Message has no From address")]
    MissingFrom,

    /// No To, Cc or Bcc recipient was added.
    #[error("Message has no recipients")]
    NoRecipients,

    /// A custom header has an invalid name or contains a line break.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Address validation failed.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Body construction failed.
    #[error(transparent)]
    Body(#[from] BodyError),

    /// Delivery failed.
    #[error("Delivery failed: {0}")]
    Transport(#[from] TransportError),
}

impl MailerError {
    /// Whether the failed send may be retried on the same builder.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_retryable())
    }
}

/// Errors loading a [`MailerConfig`](crate::MailerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The JSON is malformed or does not match the schema.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for builder operations.
pub type Result<T> = std::result::Result<T, MailerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout(Duration::from_secs(8)).is_retryable());
        assert!(TransportError::ConnectFailed("refused".into()).is_retryable());
        assert!(
            TransportError::UnexpectedResponse {
                code: 451,
                message: "later".into()
            }
            .is_retryable()
        );
        assert!(
            !TransportError::UnexpectedResponse {
                code: 550,
                message: "no".into()
            }
            .is_retryable()
        );
        assert!(!TransportError::SubmissionRejected("exit 1".into()).is_retryable());
    }

    #[test]
    fn test_smtp_error_mapping() {
        let err: TransportError = mailforge_smtp::Error::unexpected(550, "rejected").into();
        assert!(matches!(err, TransportError::UnexpectedResponse { code: 550, .. }));

        let err: TransportError = mailforge_smtp::Error::Timeout(Duration::from_secs(8)).into();
        assert!(matches!(err, TransportError::Timeout(_)));

        let err: TransportError = mailforge_smtp::Error::NotSupported("STARTTLS".into()).into();
        assert!(matches!(err, TransportError::Protocol(msg) if msg.contains("STARTTLS")));

        let err: TransportError = mailforge_smtp::Error::Connect {
            address: "127.0.0.1:1".into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        }
        .into();
        assert!(matches!(err, TransportError::ConnectFailed(msg) if msg.contains("127.0.0.1:1")));
    }

    #[test]
    fn test_mailer_error_retryable() {
        assert!(MailerError::Transport(TransportError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(!MailerError::AlreadySent.is_retryable());
    }
}
