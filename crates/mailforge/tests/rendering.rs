//! Rendering through the public builder API, and local delivery.

#![allow(clippy::unwrap_used)]

use mailforge::{MailTransport, MailerConfig, MessageBuilder, SendState, TransferEncoding};

fn rendered(builder: &MessageBuilder) -> String {
    String::from_utf8(builder.render().unwrap()).unwrap()
}

fn base() -> MessageBuilder {
    let mut builder = MessageBuilder::new();
    builder
        .hostname("render.test")
        .from("app@example.com", "Ünïcode Sender")
        .unwrap()
        .add_to("user@bücher.example", "")
        .unwrap();
    builder
}

#[test]
fn plain_ascii_message_is_7bit() {
    let mut builder = base();
    builder.subject("Plain").body("Just text.\n");

    let out = rendered(&builder);
    assert!(out.contains("Content-Type: text/plain; charset=us-ascii\r\n"));
    assert!(!out.contains("Content-Transfer-Encoding"));
    assert!(out.ends_with("\r\n\r\nJust text.\r\n"));
    assert!(out.contains("To: user@xn--bcher-kva.example\r\n"));
    assert!(out.contains("From: =?utf-8?"));
}

#[test]
fn attachment_with_alternative_is_mixed_over_alternative() {
    let mut builder = base();
    builder
        .subject("Invoice")
        .html_body("<p>Your invoice</p>")
        .alt_body("Your invoice")
        .attach_bytes("invoice.pdf", b"%PDF-1.4".to_vec())
        .unwrap();

    let out = rendered(&builder);
    let mixed = out.find("multipart/mixed").unwrap();
    let alternative = out.find("multipart/alternative").unwrap();
    assert!(mixed < alternative);
    assert!(out.contains("Content-Type: application/pdf; name=\"invoice.pdf\"\r\n"));
    assert!(out.contains("Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n"));
    assert!(out.contains("JVBERi0xLjQ=\r\n"));
    assert!(out.contains("This is a multi-part message in MIME format."));
}

#[test]
fn attached_file_is_read_at_render_time() {
    let path = std::env::temp_dir().join(format!("mailforge-render-{}.txt", std::process::id()));
    std::fs::write(&path, "file contents").unwrap();

    let mut builder = base();
    builder.body("See attached").attach_file(&path).unwrap();

    let out = rendered(&builder);
    assert!(out.contains("Content-Type: text/plain; name="));
    assert!(out.contains("ZmlsZSBjb250ZW50cw==\r\n"));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn word_wrap_and_quoted_printable() {
    let mut builder = base();
    builder
        .encoding(TransferEncoding::QuotedPrintable)
        .word_wrap(20)
        .body("Grüße aus der schönen Stadt am Fluss");

    let out = rendered(&builder);
    assert!(out.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
    let body = out.split_once("\r\n\r\n").unwrap().1;
    for line in body.lines() {
        assert!(line.len() <= 76, "{line:?}");
    }
    assert!(body.contains("Gr=C3=BC=C3=9Fe"));
}

#[cfg(unix)]
#[tokio::test]
async fn local_transport_from_config() {
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("mailforge-sendmail-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let program = dir.join("sendmail");
    std::fs::write(&program, "#!/bin/sh\ncat > \"$(dirname \"$0\")/message\"\n").unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = MailerConfig::from_json(&format!(
        r#"{{
            "hostname": "local.test",
            "from": {{"email": "app@example.com"}},
            "transport": {{"type": "local", "sendmail_path": "{}"}}
        }}"#,
        program.display()
    ))
    .unwrap();

    let mut transport = MailTransport::from_config(&config);
    let mut builder = MessageBuilder::from_config(&config).unwrap();
    builder
        .add_bcc("hidden@example.com", "")
        .unwrap()
        .subject("Local")
        .body("via sendmail");
    builder.send(&mut transport).await.unwrap();
    assert_eq!(builder.state(), SendState::Sent);

    let message = std::fs::read_to_string(dir.join("message")).unwrap();
    // sendmail -t reads recipients from headers, so Bcc stays in.
    assert!(message.contains("\r\nBcc: hidden@example.com\r\n"));
    assert!(message.contains("\r\nTo: undisclosed-recipients:;\r\n"));
    assert!(message.ends_with("\r\n\r\nvia sendmail\r\n"));
}
