//! Scripted loopback SMTP server for delivery tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One step of a scripted session.
pub enum Step {
    /// Expect a command line starting with the prefix, then send the reply.
    Expect(&'static str, &'static str),
    /// Read message data up to the terminating dot line, then send the reply.
    Payload(&'static str),
    /// Expect a command line starting with the prefix and never answer it.
    Ignore(&'static str),
    /// Send nothing and hold the connection open.
    Stall,
}

/// What the server observed during one session.
#[derive(Debug, Default)]
pub struct Session {
    /// Command lines, without CRLF.
    pub commands: Vec<String>,
    /// Raw DATA payload, dot-stuffing intact.
    pub payload: Vec<u8>,
    /// Anything the client sent after the script ran out.
    pub trailing: Vec<u8>,
}

impl Session {
    /// Payload as text.
    pub fn payload_text(&self) -> String {
        String::from_utf8(self.payload.clone()).unwrap()
    }
}

/// Result of a whole server run.
#[derive(Debug)]
pub struct ServerRun {
    /// One entry per scripted session.
    pub sessions: Vec<Session>,
    /// Whether a connection arrived after the scripted sessions.
    pub extra_connection: bool,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Starts a server that plays one script per accepted connection.
pub async fn start(scripts: Vec<Vec<Step>>) -> (u16, JoinHandle<ServerRun>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let mut sessions = Vec::new();
        for script in scripts {
            let (socket, _) = listener.accept().await.unwrap();
            sessions.push(play(socket, script).await);
        }

        let extra_connection = tokio::time::timeout(Duration::from_millis(200), listener.accept())
            .await
            .is_ok();

        ServerRun {
            sessions,
            extra_connection,
        }
    });

    (port, handle)
}

async fn play(socket: tokio::net::TcpStream, script: Vec<Step>) -> Session {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    let mut session = Session::default();

    if matches!(script.first(), Some(Step::Stall)) {
        // Wait for the client to give up and close.
        let _ = reader.read_to_end(&mut session.trailing).await;
        return session;
    }
    write.write_all(b"220 mx.test ESMTP ready\r\n").await.unwrap();

    for step in script {
        match step {
            Step::Expect(prefix, reply) => {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return session;
                }
                let line = line.trim_end().to_string();
                assert!(line.starts_with(prefix), "expected {prefix:?}, got {line:?}");
                session.commands.push(line);
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            Step::Ignore(prefix) => {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return session;
                }
                let line = line.trim_end().to_string();
                assert!(line.starts_with(prefix), "expected {prefix:?}, got {line:?}");
                session.commands.push(line);
            }
            Step::Payload(reply) => {
                loop {
                    let mut line = Vec::new();
                    if reader.read_until(b'\n', &mut line).await.unwrap() == 0 {
                        return session;
                    }
                    if line == b".\r\n" {
                        break;
                    }
                    session.payload.extend_from_slice(&line);
                }
                write.write_all(reply.as_bytes()).await.unwrap();
            }
            Step::Stall => {}
        }
    }

    let _ = reader.read_to_end(&mut session.trailing).await;
    session
}
