//! Full submission sessions against a loopback server.

#![allow(clippy::unwrap_used)]

use mailforge_smtp::connection::connect;
use mailforge_smtp::{Client, Error};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Accepts one session, answers the dialog and returns the raw DATA payload
/// (everything between the 354 and the terminating dot line).
async fn accepting_server() -> (u16, tokio::task::JoinHandle<(Vec<String>, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        write.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();

        let mut commands = Vec::new();
        let mut payload = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            let reply: &[u8] = match line.as_str() {
                l if l.starts_with("EHLO") => b"250-mx.test\r\n250 8BITMIME\r\n",
                l if l.starts_with("MAIL FROM") || l.starts_with("RCPT TO") => b"250 ok\r\n",
                "DATA" => {
                    write.write_all(b"354 end with .\r\n").await.unwrap();
                    commands.push(line);
                    loop {
                        let mut data_line = Vec::new();
                        reader.read_until(b'\n', &mut data_line).await.unwrap();
                        if data_line == b".\r\n" {
                            break;
                        }
                        payload.extend_from_slice(&data_line);
                    }
                    write.write_all(b"250 queued\r\n").await.unwrap();
                    continue;
                }
                "QUIT" => b"221 bye\r\n",
                _ => b"500 unknown\r\n",
            };
            commands.push(line);
            write.write_all(reply).await.unwrap();
        }
        (commands, payload)
    });

    (port, handle)
}

#[tokio::test]
async fn complete_session_stuffs_dots() {
    init_tracing();
    let (port, server) = accepting_server().await;

    let stream = assert_ok!(connect("127.0.0.1", port, Duration::from_secs(5)).await);
    let client = assert_ok!(Client::from_stream(stream, Duration::from_secs(5)).await);
    let client = assert_ok!(client.ehlo("client.test").await);
    let client = assert_ok!(client.mail_from("from@example.com").await);
    let client = assert_ok!(client.rcpt_to("to@example.com").await);
    let client = assert_ok!(client.data().await);
    let client = assert_ok!(
        client
            .send_message(b"Subject: dots\r\n\r\n.leading\nplain\r\n")
            .await
    );
    assert_ok!(client.quit().await);

    let (commands, payload) = server.await.unwrap();
    assert_eq!(
        commands,
        [
            "EHLO client.test",
            "MAIL FROM:<from@example.com>",
            "RCPT TO:<to@example.com>",
            "DATA",
            "QUIT"
        ]
    );
    assert_eq!(payload, b"Subject: dots\r\n\r\n..leading\r\nplain\r\n");
}

#[tokio::test]
async fn rejected_sender_stops_dialog() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket
            .write_all(b"220 mx.test\r\n")
            .await
            .unwrap();
        let mut buf = vec![0u8; 256];
        let n = socket.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"EHLO"));
        socket.write_all(b"250 mx.test\r\n").await.unwrap();
        let n = socket.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"MAIL FROM"));
        socket.write_all(b"550 sender rejected\r\n").await.unwrap();

        // Client must hang up without further commands.
        let mut rest = Vec::new();
        socket.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let stream = connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
    let client = Client::from_stream(stream, Duration::from_secs(5)).await.unwrap();
    let client = client.ehlo("client.test").await.unwrap();
    let err = assert_err!(client.mail_from("from@example.com").await);
    assert!(matches!(err, Error::UnexpectedResponse { code: 550, .. }));

    assert!(server.await.unwrap().is_empty());
}
