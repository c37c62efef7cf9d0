//! The frozen message draft handed to the codecs.

use crate::address_set::AddressSet;
use crate::attachment::Attachment;
use crate::encoding::wrap_text;
use crate::error::BodyError;
use std::fmt;
use std::str::FromStr;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    #[default]
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Returns true for the encodings a multipart container may declare.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }
}

impl FromStr for TransferEncoding {
    type Err = BodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7bit" => Ok(Self::SevenBit),
            "8bit" => Ok(Self::EightBit),
            "base64" => Ok(Self::Base64),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            "binary" => Ok(Self::Binary),
            _ => Err(BodyError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Message priority, rendered as `X-Priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
    /// `X-Priority: 1`
    High,
    /// No header.
    #[default]
    Normal,
    /// `X-Priority: 5`
    Low,
}

impl Priority {
    /// The `X-Priority` value, or `None` for normal priority.
    #[must_use]
    pub const fn header_value(self) -> Option<u8> {
        match self {
            Self::High => Some(1),
            Self::Normal => None,
            Self::Low => Some(5),
        }
    }
}

/// A complete message draft.
///
/// Built by the caller's builder and then only read: the body codec and the
/// header assembly both take it by reference.
#[derive(Debug, Clone, Default)]
pub struct MessageSpec {
    /// Subject line, unencoded.
    pub subject: String,
    /// Charset declared for text parts.
    pub charset: String,
    /// Preferred transfer encoding for text parts.
    pub encoding: TransferEncoding,
    /// Priority.
    pub priority: Priority,
    /// Primary body.
    pub body: String,
    /// Whether `body` is HTML.
    pub is_html: bool,
    /// Plain-text alternative to an HTML body.
    pub alt_body: Option<String>,
    /// Word wrap width; 0 disables wrapping.
    pub word_wrap: usize,
    /// Custom headers, already validated.
    pub custom_headers: Vec<(String, String)>,
    /// Attachments in insertion order.
    pub attachments: Vec<Attachment>,
    /// Addresses by role.
    pub addresses: AddressSet,
    /// Explicit Message-ID, without angle brackets.
    pub message_id: Option<String>,
}

impl MessageSpec {
    /// Returns the draft with word wrapping applied.
    ///
    /// The alternative body is wrapped when there is one, otherwise the
    /// primary body.
    #[must_use]
    pub fn word_wrapped(mut self) -> Self {
        if self.word_wrap == 0 {
            return self;
        }
        match self.alt_body.as_mut() {
            Some(alt) => *alt = wrap_text(alt, self.word_wrap, false),
            None => self.body = wrap_text(&self.body, self.word_wrap, false),
        }
        self
    }

    /// Whether a non-empty alternative body is present.
    #[must_use]
    pub fn has_alt_body(&self) -> bool {
        self.alt_body.as_ref().is_some_and(|alt| !alt.is_empty())
    }

    /// Whether any attachment is inline.
    #[must_use]
    pub fn has_inline(&self) -> bool {
        self.attachments.iter().any(Attachment::is_inline)
    }

    /// Whether any attachment is a regular attachment.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.attachments.iter().any(|a| !a.is_inline())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("7bit".parse::<TransferEncoding>().unwrap(), TransferEncoding::SevenBit);
        assert_eq!(
            " Quoted-Printable ".parse::<TransferEncoding>().unwrap(),
            TransferEncoding::QuotedPrintable
        );
        assert!(matches!(
            "uuencode".parse::<TransferEncoding>(),
            Err(BodyError::UnsupportedEncoding(name)) if name == "uuencode"
        ));
    }

    #[test]
    fn test_encoding_display() {
        assert_eq!(TransferEncoding::Base64.to_string(), "base64");
        assert_eq!(TransferEncoding::EightBit.to_string(), "8bit");
        assert!(TransferEncoding::Binary.is_identity());
        assert!(!TransferEncoding::QuotedPrintable.is_identity());
    }

    #[test]
    fn test_priority_header_value() {
        assert_eq!(Priority::High.header_value(), Some(1));
        assert_eq!(Priority::Normal.header_value(), None);
        assert_eq!(Priority::Low.header_value(), Some(5));
    }

    #[test]
    fn test_word_wrap_primary_body() {
        let spec = MessageSpec {
            body: "one two three four".into(),
            word_wrap: 9,
            ..MessageSpec::default()
        }
        .word_wrapped();
        assert_eq!(spec.body, "one two\r\nthree\r\nfour\r\n");
    }

    #[test]
    fn test_word_wrap_prefers_alt_body() {
        let spec = MessageSpec {
            body: "<p>one two three four</p>".into(),
            is_html: true,
            alt_body: Some("one two three four".into()),
            word_wrap: 9,
            ..MessageSpec::default()
        }
        .word_wrapped();
        assert_eq!(spec.body, "<p>one two three four</p>");
        assert_eq!(spec.alt_body.as_deref(), Some("one two\r\nthree\r\nfour\r\n"));
    }

    #[test]
    fn test_word_wrap_disabled() {
        let spec = MessageSpec {
            body: "one two three four".into(),
            ..MessageSpec::default()
        }
        .word_wrapped();
        assert_eq!(spec.body, "one two three four");
    }
}
