//! Delivery transports.
//!
//! A [`Transport`] takes a fully rendered message (header block and body)
//! plus its envelope and hands it to the next hop. Transports hold no state
//! between sends: each delivery opens and closes its own connection or
//! child process.

mod local;
mod smtp;

pub use local::LocalMailTransport;
pub use smtp::SmtpTransport;

use crate::config::{MailerConfig, TransportConfig};
use crate::error::TransportError;
use mailforge_mime::Address;
use std::future::Future;

/// Envelope sender and recipients, independent of the header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Return path (`MAIL FROM` / `sendmail -f`).
    pub sender: Option<Address>,
    /// Every recipient, To, Cc and Bcc included.
    pub recipients: Vec<Address>,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(sender: Option<Address>, recipients: Vec<Address>) -> Self {
        Self { sender, recipients }
    }

    /// The return path address, empty for a null sender.
    #[must_use]
    pub fn sender_email(&self) -> String {
        self.sender.as_ref().map(Address::email).unwrap_or_default()
    }
}

/// A way of handing a rendered message to the next hop.
pub trait Transport {
    /// Delivers `header` (CRLF-terminated header lines) followed by a blank
    /// line and `body`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why delivery failed.
    fn deliver(
        &mut self,
        envelope: &Envelope,
        header: &str,
        body: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether the `To` header belongs in the header block.
    fn includes_recipient_headers(&self) -> bool {
        true
    }

    /// Whether the `Subject` header belongs in the header block.
    fn includes_subject_header(&self) -> bool {
        true
    }

    /// Whether the `Bcc` header belongs in the header block.
    fn includes_bcc_header(&self) -> bool;
}

/// Joins header block, separator and body into one message.
pub(crate) fn assemble(header: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(header.len() + 2 + body.len());
    message.extend_from_slice(header.as_bytes());
    message.extend_from_slice(b"\r\n");
    message.extend_from_slice(body);
    message
}

/// Transport selected by configuration.
#[derive(Debug)]
pub enum MailTransport {
    /// Local sendmail program.
    Local(LocalMailTransport),
    /// SMTP relay.
    Smtp(SmtpTransport),
}

impl MailTransport {
    /// Builds the transport named in `config`.
    #[must_use]
    pub fn from_config(config: &MailerConfig) -> Self {
        match &config.transport {
            TransportConfig::Local { sendmail_path } => {
                Self::Local(LocalMailTransport::new(sendmail_path))
            }
            TransportConfig::Smtp(settings) => {
                Self::Smtp(SmtpTransport::new(settings.clone(), &config.hostname))
            }
        }
    }
}

impl Transport for MailTransport {
    async fn deliver(
        &mut self,
        envelope: &Envelope,
        header: &str,
        body: &[u8],
    ) -> Result<(), TransportError> {
        match self {
            Self::Local(transport) => transport.deliver(envelope, header, body).await,
            Self::Smtp(transport) => transport.deliver(envelope, header, body).await,
        }
    }

    fn includes_recipient_headers(&self) -> bool {
        match self {
            Self::Local(transport) => transport.includes_recipient_headers(),
            Self::Smtp(transport) => transport.includes_recipient_headers(),
        }
    }

    fn includes_subject_header(&self) -> bool {
        match self {
            Self::Local(transport) => transport.includes_subject_header(),
            Self::Smtp(transport) => transport.includes_subject_header(),
        }
    }

    fn includes_bcc_header(&self) -> bool {
        match self {
            Self::Local(transport) => transport.includes_bcc_header(),
            Self::Smtp(transport) => transport.includes_bcc_header(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{Security, SmtpSettings};
    use mailforge_mime::Role;

    #[test]
    fn test_assemble() {
        assert_eq!(assemble("Subject: x\r\n", b"body\r\n"), b"Subject: x\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_envelope_sender_email() {
        let sender = Address::new(Role::From, "Bounce@Example.com").unwrap();
        let envelope = Envelope::new(Some(sender), Vec::new());
        assert_eq!(envelope.sender_email(), "bounce@example.com");
        assert_eq!(Envelope::new(None, Vec::new()).sender_email(), "");
    }

    #[test]
    fn test_from_config() {
        let local = MailTransport::from_config(&MailerConfig::default());
        assert!(matches!(local, MailTransport::Local(_)));
        assert!(local.includes_bcc_header());

        let config = MailerConfig {
            transport: TransportConfig::Smtp(SmtpSettings::new("mx.example.com", Security::None)),
            ..MailerConfig::default()
        };
        let smtp = MailTransport::from_config(&config);
        assert!(matches!(smtp, MailTransport::Smtp(_)));
        assert!(!smtp.includes_bcc_header());
        assert!(smtp.includes_recipient_headers());
        assert!(smtp.includes_subject_header());
    }

    #[test]
    fn test_from_config_sanitizes_hostname() {
        let config = MailerConfig {
            hostname: "host.test\nQUIT".into(),
            transport: TransportConfig::Smtp(SmtpSettings::new("mx.example.com", Security::None)),
            ..MailerConfig::default()
        };
        let MailTransport::Smtp(smtp) = MailTransport::from_config(&config) else {
            panic!("expected SMTP transport");
        };
        assert_eq!(smtp.client_hostname(), "host.testQUIT");
    }
}
