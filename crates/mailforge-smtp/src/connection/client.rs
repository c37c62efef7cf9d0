//! Type-state SMTP client.
//!
//! Each method sends one command and accepts only the reply codes the
//! submission dialog allows at that step; anything else consumes the client
//! and returns [`Error::UnexpectedResponse`]. Every reply read is bounded by
//! the reply timeout.

use super::{ServerInfo, SmtpStream};
use crate::command::Command;
use crate::data;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rustls::ClientConfig;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Default time to wait for each server reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(8);

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    client_hostname: String,
    reply_timeout: Duration,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or times out, or if
    /// the greeting code is not 220.
    pub async fn from_stream(stream: SmtpStream, reply_timeout: Duration) -> Result<Self> {
        let mut client = Self {
            stream,
            server_info: ServerInfo::default(),
            client_hostname: String::new(),
            reply_timeout,
            _state: PhantomData,
        };

        let greeting = client
            .read_reply()
            .await?
            .expect(&[ReplyCode::SERVICE_READY])?;

        // Server hostname is the first word of the greeting
        client.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(client)
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 250.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.client_hostname = client_hostname.to_string();
        self.send_ehlo().await?;
        Ok(self)
    }

    async fn send_ehlo(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: self.client_hostname.clone(),
        };
        let reply = self.send_command(cmd).await?.expect(&[ReplyCode::OK])?;

        // First line is the server greeting, the rest are extensions
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(String::as_str)
            .map(Extension::parse)
            .collect::<HashSet<_>>();
        Ok(())
    }

    /// Upgrades the connection to TLS using STARTTLS, then repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if STARTTLS was not advertised, an
    /// unexpected-response error unless the server replies 220, or a TLS
    /// error if the handshake fails.
    pub async fn starttls(mut self, hostname: &str, config: Arc<ClientConfig>) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.send_command(Command::StartTls)
            .await?
            .expect(&[ReplyCode::SERVICE_READY])?;

        self.stream = self.stream.upgrade_to_tls(hostname, config).await?;
        tracing::debug!(hostname, "TLS established");

        // Capabilities may differ once encrypted
        self.send_ehlo().await?;
        Ok(self)
    }

    /// Authenticates with the mechanism the server supports: LOGIN, or
    /// PLAIN when the server advertises PLAIN but not LOGIN.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn authenticate(self, username: &str, password: &str) -> Result<Client<Authenticated>> {
        let mechanisms = self.server_info.auth_mechanisms();
        if mechanisms.contains(&AuthMechanism::Plain) && !mechanisms.contains(&AuthMechanism::Login) {
            self.auth_plain(username, password).await
        } else {
            self.auth_login(username, password).await
        }
    }

    /// Authenticates using LOGIN: `AUTH LOGIN` (334), username (334),
    /// password (235).
    ///
    /// # Errors
    ///
    /// Returns an error if any step gets a different reply.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        self.send_command(cmd)
            .await?
            .expect(&[ReplyCode::AUTH_CONTINUE])?;

        let cmd = Command::AuthResponse(STANDARD.encode(username.as_bytes()));
        self.send_command(cmd)
            .await?
            .expect(&[ReplyCode::AUTH_CONTINUE])?;

        let cmd = Command::AuthResponse(STANDARD.encode(password.as_bytes()));
        self.send_command(cmd)
            .await?
            .expect(&[ReplyCode::AUTH_SUCCESS])?;

        Ok(self.into_state())
    }

    /// Authenticates using PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 235.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        // Build PLAIN response: \0username\0password
        let credentials = format!("\0{username}\0{password}");

        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials.as_bytes())),
        };
        self.send_command(cmd)
            .await?
            .expect(&[ReplyCode::AUTH_SUCCESS])?;

        Ok(self.into_state())
    }

    /// Starts a mail transaction without authentication (if server allows).
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 250.
    pub async fn mail_from(self, from: &str) -> Result<Client<MailTransaction>> {
        self.start_transaction(from).await
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 250.
    pub async fn mail_from(self, from: &str) -> Result<Client<MailTransaction>> {
        self.start_transaction(from).await
    }
}

impl Client<MailTransaction> {
    /// Adds the first recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 250 or 251.
    pub async fn rcpt_to(mut self, to: &str) -> Result<Client<RecipientAdded>> {
        self.add_recipient(to).await?;
        Ok(self.into_state())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 250 or 251.
    pub async fn rcpt_to(mut self, to: &str) -> Result<Self> {
        self.add_recipient(to).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 354.
    pub async fn data(mut self) -> Result<Client<Data>> {
        self.send_command(Command::Data)
            .await?
            .expect(&[ReplyCode::START_DATA])?;
        Ok(self.into_state())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Content is prepared with [`data::prepare`] (line breaks normalised,
    /// long lines split, leading dots stuffed) and terminated with `.`.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the server does not reply 250.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Connected>> {
        let prepared = data::prepare(message);
        tracing::debug!(bytes = prepared.len(), "C: <message data>");
        self.stream.write_all(&prepared).await?;
        self.stream.write_all(data::END_OF_DATA).await?;

        self.read_reply().await?.expect(&[ReplyCode::OK])?;
        Ok(self.into_state())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    fn into_state<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            client_hostname: self.client_hostname,
            reply_timeout: self.reply_timeout,
            _state: PhantomData,
        }
    }

    async fn start_transaction(mut self, from: &str) -> Result<Client<MailTransaction>> {
        let cmd = Command::MailFrom {
            from: from.to_string(),
        };
        self.send_command(cmd).await?.expect(&[ReplyCode::OK])?;
        Ok(self.into_state())
    }

    async fn add_recipient(&mut self, to: &str) -> Result<()> {
        let cmd = Command::RcptTo { to: to.to_string() };
        self.send_command(cmd)
            .await?
            .expect(&[ReplyCode::OK, ReplyCode::FORWARD])?;
        Ok(())
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        tracing::debug!(command = ?cmd, "C:");
        self.stream.write_all(&cmd.serialize()).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let timeout = self.reply_timeout;
        let reply = tokio::time::timeout(timeout, Self::read_reply_lines(&mut self.stream))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        tracing::debug!(code = reply.code.as_u16(), "S:");
        Ok(reply)
    }

    async fn read_reply_lines(stream: &mut SmtpStream) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = stream.read_line().await?;
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        parse_reply(&lines)
    }

    /// Returns true if the session is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error unless the server replies 221.
    pub async fn quit(mut self) -> Result<()> {
        self.send_command(Command::Quit)
            .await?
            .expect(&[ReplyCode::CLOSING])?;
        Ok(())
    }
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
    use crate::connection::connect;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Serves `script` as (expected command prefix, reply) pairs after a
    /// 220 greeting and returns every line the client sent.
    async fn scripted_server(
        script: Vec<(&'static str, &'static str)>,
    ) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(b"220 test.local ESMTP\r\n").await.unwrap();

            let mut seen = Vec::new();
            for (prefix, reply) in script {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                assert!(line.starts_with(prefix), "expected {prefix:?}, got {line:?}");
                seen.push(line);
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            seen
        });
        (port, handle)
    }

    async fn open(port: u16) -> Client<Connected> {
        let stream = connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
        Client::from_stream(stream, Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn ehlo_parses_extensions() {
        let (port, server) = scripted_server(vec![(
            "EHLO client.local",
            "250-test.local\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n",
        )])
        .await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        assert_eq!(client.server_info().hostname, "test.local");
        assert!(client.server_info().supports_starttls());
        assert_eq!(
            client.server_info().auth_mechanisms(),
            vec![AuthMechanism::Plain, AuthMechanism::Login]
        );
        drop(client);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn auth_login_dialog() {
        let (port, server) = scripted_server(vec![
            ("EHLO", "250-test.local\r\n250 AUTH LOGIN\r\n"),
            ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
            ("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
            ("c2VjcmV0", "235 ok\r\n"),
            ("MAIL FROM:<a@example.com>", "250 ok\r\n"),
        ])
        .await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        let client = client.authenticate("user", "secret").await.unwrap();
        let _client = client.mail_from("a@example.com").await.unwrap();
        assert_eq!(server.await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn auth_plain_when_login_not_offered() {
        let (port, server) = scripted_server(vec![
            ("EHLO", "250-test.local\r\n250 AUTH PLAIN\r\n"),
            ("AUTH PLAIN AHVzZXIAc2VjcmV0", "235 ok\r\n"),
        ])
        .await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        client.authenticate("user", "secret").await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn auth_failure_is_unexpected_response() {
        let (port, _server) = scripted_server(vec![
            ("EHLO", "250 test.local\r\n"),
            ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
            ("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
            ("d3Jvbmc=", "535 bad credentials\r\n"),
        ])
        .await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        let err = client.auth_login("user", "wrong").await.unwrap_err();
        assert_eq!(err.code(), Some(535));
    }

    #[tokio::test]
    async fn rcpt_accepts_251() {
        let (port, server) = scripted_server(vec![
            ("EHLO", "250 test.local\r\n"),
            ("MAIL FROM:<a@example.com>", "250 ok\r\n"),
            ("RCPT TO:<b@example.com>", "251 will forward\r\n"),
            ("RCPT TO:<c@example.com>", "250 ok\r\n"),
            ("DATA", "354 go ahead\r\n"),
        ])
        .await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        let client = client.mail_from("a@example.com").await.unwrap();
        let client = client.rcpt_to("b@example.com").await.unwrap();
        let client = client.rcpt_to("c@example.com").await.unwrap();
        let client = client.data().await.unwrap();
        drop(client);
        assert_eq!(server.await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn starttls_requires_advertisement() {
        let (port, server) = scripted_server(vec![("EHLO", "250 test.local\r\n")]).await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        let err = client
            .starttls("test.local", crate::connection::default_tls_config())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn starttls_rejected() {
        let (port, _server) = scripted_server(vec![
            ("EHLO", "250-test.local\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "454 TLS not available\r\n"),
        ])
        .await;

        let client = open(port).await.ehlo("client.local").await.unwrap();
        let err = client
            .starttls("test.local", crate::connection::default_tls_config())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(454));
    }

    #[tokio::test]
    async fn greeting_must_be_220() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"554 no service\r\n").await.unwrap();
        });

        let stream = connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
        let err = Client::from_stream(stream, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.code(), Some(554));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let stream = connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
        let err = Client::from_stream(stream, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(100)));
        server.abort();
    }
}
