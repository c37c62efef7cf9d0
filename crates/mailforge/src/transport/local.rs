//! Delivery through a local sendmail-compatible program.

use super::{Envelope, Transport, assemble};
use crate::error::TransportError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Pipes messages to `sendmail -oi -t`.
///
/// Recipients are taken from the header block by the program (`-t`), so the
/// `Bcc` header is included and left for sendmail to strip.
#[derive(Debug, Clone)]
pub struct LocalMailTransport {
    sendmail_path: PathBuf,
}

impl LocalMailTransport {
    /// Creates a transport running the program at `sendmail_path`.
    #[must_use]
    pub fn new(sendmail_path: impl AsRef<Path>) -> Self {
        Self {
            sendmail_path: sendmail_path.as_ref().to_path_buf(),
        }
    }

    /// Path of the submission program.
    #[must_use]
    pub fn sendmail_path(&self) -> &Path {
        &self.sendmail_path
    }

    fn command(&self, envelope: &Envelope) -> Command {
        let mut command = Command::new(&self.sendmail_path);
        command.arg("-oi").arg("-t");

        // The sender ends up on a command line; only pass it when harmless.
        match &envelope.sender {
            Some(sender) if sender.is_shell_safe() => {
                command.arg("-f").arg(sender.email());
            }
            Some(sender) => {
                tracing::warn!(sender = %sender.email(), "Envelope sender not shell-safe, omitting -f");
            }
            None => {}
        }

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }
}

impl Transport for LocalMailTransport {
    async fn deliver(
        &mut self,
        envelope: &Envelope,
        header: &str,
        body: &[u8],
    ) -> Result<(), TransportError> {
        let program = self.sendmail_path.display().to_string();
        tracing::debug!(program = %program, recipients = envelope.recipients.len(), "Spawning sendmail");

        let mut child = self.command(envelope).spawn().map_err(|e| {
            TransportError::SubmissionRejected(format!("could not run {program}: {e}"))
        })?;

        let message = assemble(header, body);
        let written = match child.stdin.take() {
            Some(mut stdin) => {
                let result = stdin.write_all(&message).await;
                // Closing stdin ends the message.
                drop(stdin);
                result
            }
            None => Ok(()),
        };

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::SubmissionRejected(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        written?;

        Ok(())
    }

    fn includes_bcc_header(&self) -> bool {
        true
    }
}

#[cfg(all(test, unix))]
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
    use mailforge_mime::{Address, Role};
    use std::os::unix::fs::PermissionsExt;

    /// Writes an executable shell script into a fresh temp directory.
    fn script(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mailforge-local-{name}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sendmail");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn envelope(sender: &str) -> Envelope {
        Envelope::new(
            Some(Address::new(Role::From, sender).unwrap()),
            vec![Address::new(Role::To, "to@example.com").unwrap()],
        )
    }

    #[tokio::test]
    async fn test_pipes_message_with_flags() {
        let path = script(
            "ok",
            r#"dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/args"
cat > "$dir/stdin""#,
        );
        let dir = path.parent().unwrap().to_path_buf();

        let mut transport = LocalMailTransport::new(&path);
        transport
            .deliver(&envelope("bounce@example.com"), "Subject: hi\r\n", b"body\r\n")
            .await
            .unwrap();

        let args = std::fs::read_to_string(dir.join("args")).unwrap();
        assert_eq!(args, "-oi\n-t\n-f\nbounce@example.com\n");
        let stdin = std::fs::read(dir.join("stdin")).unwrap();
        assert_eq!(stdin, b"Subject: hi\r\n\r\nbody\r\n");
    }

    #[tokio::test]
    async fn test_unsafe_sender_not_passed() {
        let path = script(
            "unsafe",
            r#"dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/args"
cat > /dev/null"#,
        );
        let dir = path.parent().unwrap().to_path_buf();

        let mut transport = LocalMailTransport::new(&path);
        transport
            .deliver(&envelope("o'brien@example.com"), "Subject: hi\r\n", b"x")
            .await
            .unwrap();

        let args = std::fs::read_to_string(dir.join("args")).unwrap();
        assert_eq!(args, "-oi\n-t\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_rejected() {
        let path = script("fail", "cat > /dev/null\necho 'queue full' >&2\nexit 75");

        let mut transport = LocalMailTransport::new(&path);
        let err = transport
            .deliver(&envelope("a@example.com"), "Subject: hi\r\n", b"x")
            .await
            .unwrap_err();
        match err {
            TransportError::SubmissionRejected(msg) => assert!(msg.contains("queue full"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!TransportError::SubmissionRejected(String::new()).is_retryable());
    }

    #[tokio::test]
    async fn test_missing_program_rejected() {
        let mut transport = LocalMailTransport::new("/nonexistent/sendmail");
        let err = transport
            .deliver(&envelope("a@example.com"), "Subject: hi\r\n", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::SubmissionRejected(_)));
    }
}
