//! End-to-end sends through `SmtpTransport` against a scripted server.

#![allow(clippy::unwrap_used)]

mod common;

use common::Step::{Expect, Ignore, Payload, Stall};
use mailforge::{
    MailerError, MessageBuilder, Security, SendState, SmtpSettings, SmtpTransport, TransportError,
};
use tokio_test::{assert_err, assert_ok};

fn settings(port: u16, security: Security) -> SmtpSettings {
    let mut settings = SmtpSettings::new("127.0.0.1", security);
    settings.port = Some(port);
    settings.timeout_secs = 5;
    settings.connect_timeout_secs = 5;
    settings
}

fn transport(port: u16, security: Security) -> SmtpTransport {
    SmtpTransport::new(settings(port, security), "client.test")
}

fn message() -> MessageBuilder {
    let mut builder = MessageBuilder::new();
    builder
        .hostname("client.test")
        .from("sender@example.com", "Sender")
        .unwrap()
        .add_to("to@example.com", "Recipient")
        .unwrap()
        .subject("Report")
        .body("Hello,\n.hidden line\nBye");
    builder
}

#[tokio::test]
async fn delivers_with_auth_login_and_hides_bcc() {
    common::init_tracing();
    let (port, server) = common::start(vec![vec![
        Expect("EHLO client.test", "250-mx.test\r\n250 AUTH LOGIN PLAIN\r\n"),
        Expect("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
        Expect("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
        Expect("c2VjcmV0", "235 authenticated\r\n"),
        Expect("MAIL FROM:<sender@example.com>", "250 ok\r\n"),
        Expect("RCPT TO:<to@example.com>", "250 ok\r\n"),
        Expect("RCPT TO:<hidden@example.com>", "251 will forward\r\n"),
        Expect("DATA", "354 go ahead\r\n"),
        Payload("250 queued\r\n"),
        Expect("QUIT", "221 bye\r\n"),
    ]])
    .await;

    let mut settings = settings(port, Security::None);
    settings.username = Some("user".into());
    settings.password = Some("secret".into());
    let mut transport = SmtpTransport::new(settings, "client.test");

    let mut builder = message();
    builder.add_bcc("hidden@example.com", "").unwrap();
    assert_ok!(builder.send(&mut transport).await);
    assert_eq!(builder.state(), SendState::Sent);

    // A second send never reaches the wire.
    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(err, MailerError::AlreadySent));

    let run = server.await.unwrap();
    assert!(!run.extra_connection);

    let session = &run.sessions[0];
    assert!(session.trailing.is_empty());
    let payload = session.payload_text();
    let (header, body) = payload.split_once("\r\n\r\n").unwrap();
    assert!(header.contains("\r\nSubject: Report\r\n"));
    assert!(header.contains("\r\nTo: Recipient <to@example.com>\r\n"));
    assert!(!header.contains("Bcc:"));
    assert!(!header.contains("hidden@example.com"));
    assert_eq!(body, "Hello,\r\n..hidden line\r\nBye\r\n");
}

#[tokio::test]
async fn unanswered_quit_after_accepted_data_is_delivered() {
    common::init_tracing();
    let (port, server) = common::start(vec![vec![
        Expect("EHLO", "250 mx.test\r\n"),
        Expect("MAIL FROM", "250 ok\r\n"),
        Expect("RCPT TO:<to@example.com>", "250 ok\r\n"),
        Expect("DATA", "354 go ahead\r\n"),
        Payload("250 queued\r\n"),
        Ignore("QUIT"),
    ]])
    .await;

    let mut settings = settings(port, Security::None);
    settings.timeout_secs = 1;
    let mut transport = SmtpTransport::new(settings, "client.test");
    let mut builder = message();

    assert_ok!(builder.send(&mut transport).await);
    assert_eq!(builder.state(), SendState::Sent);

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(err, MailerError::AlreadySent));

    let run = server.await.unwrap();
    assert_eq!(run.sessions.len(), 1);
    assert!(!run.sessions[0].payload.is_empty());
    assert!(!run.extra_connection);
}

#[tokio::test]
async fn rejected_sender_is_permanent() {
    common::init_tracing();
    let (port, server) = common::start(vec![vec![
        Expect("EHLO", "250 mx.test\r\n"),
        Expect("MAIL FROM:<sender@example.com>", "550 sender rejected\r\n"),
    ]])
    .await;

    let mut transport = transport(port, Security::None);
    let mut builder = message();

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(
        err,
        MailerError::Transport(TransportError::UnexpectedResponse { code: 550, .. })
    ));
    assert!(!err.is_retryable());
    assert_eq!(builder.state(), SendState::Failed);

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(err, MailerError::Failed));

    let run = server.await.unwrap();
    // No RCPT TO and no QUIT after the rejection.
    assert_eq!(run.sessions[0].commands.len(), 2);
    assert!(run.sessions[0].trailing.is_empty());
    assert!(!run.extra_connection);
}

#[tokio::test]
async fn temporary_failure_can_be_retried() {
    common::init_tracing();
    let (port, server) = common::start(vec![
        vec![
            Expect("EHLO", "250 mx.test\r\n"),
            Expect("MAIL FROM", "250 ok\r\n"),
            Expect("RCPT TO:<to@example.com>", "451 try again later\r\n"),
        ],
        vec![
            Expect("EHLO", "250 mx.test\r\n"),
            Expect("MAIL FROM", "250 ok\r\n"),
            Expect("RCPT TO:<to@example.com>", "250 ok\r\n"),
            Expect("DATA", "354 go ahead\r\n"),
            Payload("250 queued\r\n"),
            Expect("QUIT", "221 bye\r\n"),
        ],
    ])
    .await;

    let mut transport = transport(port, Security::None);
    let mut builder = message();

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(err.is_retryable());
    assert_eq!(builder.state(), SendState::Draft);

    assert_ok!(builder.send(&mut transport).await);
    assert_eq!(builder.state(), SendState::Sent);

    let run = server.await.unwrap();
    assert_eq!(run.sessions.len(), 2);
    assert!(run.sessions[0].payload.is_empty());
    assert!(!run.sessions[1].payload.is_empty());
}

#[tokio::test]
async fn starttls_rejection_stops_dialog() {
    common::init_tracing();
    let (port, server) = common::start(vec![vec![
        Expect("EHLO", "250-mx.test\r\n250 STARTTLS\r\n"),
        Expect("STARTTLS", "454 TLS not available\r\n"),
    ]])
    .await;

    let mut transport = transport(port, Security::StartTls);
    let mut builder = message();

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(
        err,
        MailerError::Transport(TransportError::UnexpectedResponse { code: 454, .. })
    ));

    let run = server.await.unwrap();
    assert!(run.sessions[0].trailing.is_empty());
}

#[tokio::test]
async fn starttls_not_advertised_is_protocol_error() {
    common::init_tracing();
    let (port, server) = common::start(vec![vec![Expect("EHLO", "250 mx.test\r\n")]]).await;

    let mut transport = transport(port, Security::StartTls);
    let mut builder = message();

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(err, MailerError::Transport(TransportError::Protocol(_))));
    assert_eq!(builder.state(), SendState::Failed);

    let run = server.await.unwrap();
    assert!(run.sessions[0].trailing.is_empty());
}

#[tokio::test]
async fn silent_server_times_out() {
    common::init_tracing();
    let (port, server) = common::start(vec![vec![Stall]]).await;

    let mut settings = settings(port, Security::None);
    settings.timeout_secs = 1;
    let mut transport = SmtpTransport::new(settings, "client.test");
    let mut builder = message();

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(err, MailerError::Transport(TransportError::Timeout(_))));
    assert_eq!(builder.state(), SendState::Draft);

    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_retryable() {
    common::init_tracing();
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut transport = transport(port, Security::None);
    let mut builder = message();

    let err = assert_err!(builder.send(&mut transport).await);
    assert!(matches!(err, MailerError::Transport(TransportError::ConnectFailed(_))));
    assert!(err.is_retryable());
    assert_eq!(builder.state(), SendState::Draft);
}
