//! SMTP reply types.

use crate::error::{Error, Result};
use std::fmt;

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Accepts the reply only if its code is one of `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedResponse`] carrying the actual code and text.
    pub fn expect(self, expected: &[ReplyCode]) -> Result<Self> {
        if expected.contains(&self.code) {
            Ok(self)
        } else {
            Err(Error::unexpected(self.code.as_u16(), self.message_text()))
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message.join(" / "))
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the submission dialog waits for
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 251 User not local; will forward
    pub const FORWARD: Self = Self(251);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn expect_accepts_listed_code() {
        let reply = Reply::new(ReplyCode::FORWARD, vec!["will forward".to_string()]);
        let reply = reply.expect(&[ReplyCode::OK, ReplyCode::FORWARD]).unwrap();
        assert_eq!(reply.code, ReplyCode::FORWARD);
    }

    #[test]
    fn expect_rejects_other_success_code() {
        // A 2xx that is not the expected one still fails the gate.
        let reply = Reply::new(ReplyCode::OK, vec!["OK".to_string()]);
        match reply.expect(&[ReplyCode::START_DATA]) {
            Err(Error::UnexpectedResponse { code, message }) => {
                assert_eq!(code, 250);
                assert_eq!(message, "OK");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn code_classes() {
        assert!(ReplyCode::CLOSING.is_success());
        assert!(!ReplyCode::AUTH_CONTINUE.is_success());
        assert!(ReplyCode::new(421).is_transient());
        assert!(!ReplyCode::new(550).is_transient());
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", ReplyCode::OK), "250");
        let reply = Reply::new(
            ReplyCode::SERVICE_READY,
            vec!["mx.example.com ESMTP".to_string(), "ready".to_string()],
        );
        assert_eq!(reply.to_string(), "220 mx.example.com ESMTP / ready");
        assert_eq!(reply.message_text(), "mx.example.com ESMTP\nready");
    }
}
