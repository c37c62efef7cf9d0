//! Delivery over an SMTP session.

use super::{Envelope, Transport, assemble};
use crate::config::{Security, SmtpSettings};
use crate::error::TransportError;
use mailforge_mime::header::secure_header;
use mailforge_smtp::Client;
use mailforge_smtp::connection::{connect, connect_tls, default_tls_config};
use rustls::ClientConfig;
use std::sync::Arc;

/// Sends each message over a fresh SMTP session.
///
/// The session runs connect, greeting, EHLO, optional STARTTLS, optional
/// AUTH, MAIL FROM, one RCPT TO per recipient, DATA and QUIT. Any reply
/// other than the one expected at a step ends the session and the socket
/// is dropped without QUIT. Once the message data is accepted the send
/// counts as delivered, whatever QUIT returns.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    settings: SmtpSettings,
    client_hostname: String,
    tls_config: Arc<ClientConfig>,
}

impl SmtpTransport {
    /// Creates a transport; `client_hostname` is announced in EHLO with
    /// CR and LF removed.
    #[must_use]
    pub fn new(settings: SmtpSettings, client_hostname: impl AsRef<str>) -> Self {
        Self {
            settings,
            client_hostname: secure_header(client_hostname.as_ref()),
            tls_config: default_tls_config(),
        }
    }

    /// Replaces the TLS client configuration (e.g. to trust a private CA).
    #[must_use]
    pub fn with_tls_config(mut self, tls_config: Arc<ClientConfig>) -> Self {
        self.tls_config = tls_config;
        self
    }

    /// Host name announced in EHLO.
    #[must_use]
    pub fn client_hostname(&self) -> &str {
        &self.client_hostname
    }

    /// Server settings.
    #[must_use]
    pub const fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    async fn run_session(&self, envelope: &Envelope, message: &[u8]) -> Result<(), TransportError> {
        let settings = &self.settings;
        let host = settings.host.as_str();
        let port = settings.port();
        let reply_timeout = settings.reply_timeout();

        let Some((first, rest)) = envelope.recipients.split_first() else {
            return Err(TransportError::Protocol("No recipients specified".into()));
        };

        tracing::debug!(host, port, security = settings.security.display_name(), "Connecting");
        let stream = match settings.security {
            Security::Tls => {
                connect_tls(host, port, settings.connect_timeout(), Arc::clone(&self.tls_config))
                    .await?
            }
            Security::StartTls | Security::None => {
                connect(host, port, settings.connect_timeout()).await?
            }
        };

        let client = Client::from_stream(stream, reply_timeout).await?;
        let client = client.ehlo(&self.client_hostname).await?;

        let client = if settings.security == Security::StartTls {
            client
                .starttls(host, Arc::clone(&self.tls_config))
                .await?
        } else {
            client
        };

        let sender = envelope.sender_email();
        let client = match settings.credentials() {
            Some((username, password)) => {
                client
                    .authenticate(username, password)
                    .await?
                    .mail_from(&sender)
                    .await?
            }
            None => client.mail_from(&sender).await?,
        };

        let mut client = client.rcpt_to(&first.email()).await?;
        for recipient in rest {
            client = client.rcpt_to(&recipient.email()).await?;
        }

        let client = client.data().await?;
        let client = client.send_message(message).await?;

        // The server has taken the message; a failed QUIT no longer matters.
        if let Err(e) = client.quit().await {
            tracing::warn!(
                host = %settings.host,
                error = %e,
                "QUIT failed after message was accepted"
            );
        }

        Ok(())
    }
}

impl Transport for SmtpTransport {
    async fn deliver(
        &mut self,
        envelope: &Envelope,
        header: &str,
        body: &[u8],
    ) -> Result<(), TransportError> {
        let message = assemble(header, body);
        self.run_session(envelope, &message).await.inspect_err(|e| {
            tracing::warn!(host = %self.settings.host, error = %e, "SMTP session failed");
        })
    }

    fn includes_bcc_header(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_recipients_fails_before_connecting() {
        // Port 9 on a reserved address: never reached.
        let mut settings = SmtpSettings::new("192.0.2.1", Security::None);
        settings.port = Some(9);
        let mut transport = SmtpTransport::new(settings, "client.test");

        let err = transport
            .deliver(&Envelope::new(None, Vec::new()), "Subject: x\r\n", b"body")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[test]
    fn test_hides_bcc() {
        let transport = SmtpTransport::new(SmtpSettings::new("mx.test", Security::None), "client.test");
        assert!(!transport.includes_bcc_header());
        assert_eq!(transport.settings().port(), 25);
    }

    #[test]
    fn test_client_hostname_strips_line_breaks() {
        let transport = SmtpTransport::new(
            SmtpSettings::new("mx.test", Security::None),
            "client.test\r\nRCPT TO:<victim@example.com>",
        );
        assert_eq!(transport.client_hostname, "client.testRCPT TO:<victim@example.com>");
    }
}
