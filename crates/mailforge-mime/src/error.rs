//! Error types for address validation and body construction.

use std::io;
use std::path::PathBuf;

/// Result type alias for body construction.
pub type Result<T> = std::result::Result<T, BodyError>;

/// Address validation errors.
///
/// These are raised by the call that introduced the bad address, never
/// deferred to send time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Empty input, or not exactly one `@`.
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    /// `local@domain` failed the syntax check.
    #[error("Invalid address syntax: {0}")]
    InvalidSyntax(String),

    /// The address is already present for the same role.
    #[error("Duplicate address for {role}: {address}")]
    DuplicateAddress {
        /// Header name of the role (e.g. `To`).
        role: &'static str,
        /// Identity key of the rejected address.
        address: String,
    },
}

/// Body construction errors. Fatal, never retried.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// An attachment file could not be read.
    #[error("Could not read attachment {name} ({path})")]
    AttachmentUnreadable {
        /// Declared attachment name.
        name: String,
        /// Source path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Unknown `Content-Transfer-Encoding` name.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Two attachments share the same declared name.
    #[error("Duplicate attachment name: {0}")]
    DuplicateAttachment(String),
}
