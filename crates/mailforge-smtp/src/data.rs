//! Preparation of message content for the DATA phase.
//!
//! Line breaks are normalised to CRLF, lines longer than
//! [`MAX_LINE_LENGTH`] are split, and lines starting with `.` are
//! dot-stuffed (RFC 5321 section 4.5.2).

/// Longest line sent, excluding CRLF.
pub const MAX_LINE_LENGTH: usize = 998;

/// Line that terminates the DATA phase.
pub const END_OF_DATA: &[u8] = b".\r\n";

/// Returns true if the first line looks like a header field (`Name:` with
/// no space in the name).
fn starts_with_header(first_line: &[u8]) -> bool {
    first_line
        .iter()
        .position(|&b| b == b':')
        .is_some_and(|colon| colon > 0 && !first_line[..colon].contains(&b' '))
}

/// Splits one line into chunks of at most [`MAX_LINE_LENGTH`] bytes.
///
/// Splits at the last space within the budget, dropping that space; falls
/// back to a hard split. Inside the header block continuation chunks are
/// prefixed with a tab so they stay part of the same field.
fn split_long_line(mut line: &[u8], in_headers: bool) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut prefix_tab = false;

    loop {
        let budget = if prefix_tab {
            MAX_LINE_LENGTH - 1
        } else {
            MAX_LINE_LENGTH
        };

        let mut chunk = Vec::with_capacity(budget.min(line.len()) + 1);
        if prefix_tab {
            chunk.push(b'\t');
        }

        if line.len() <= budget {
            chunk.extend_from_slice(line);
            out.push(chunk);
            return out;
        }

        match line[..budget].iter().rposition(|&b| b == b' ') {
            Some(pos) if pos > 0 => {
                chunk.extend_from_slice(&line[..pos]);
                line = &line[pos + 1..];
            }
            _ => {
                chunk.extend_from_slice(&line[..budget]);
                line = &line[budget..];
            }
        }
        out.push(chunk);
        prefix_tab = in_headers;
    }
}

/// Prepares a complete message (headers, blank line, body) for the wire.
///
/// The result ends with CRLF but does not include the terminating `.` line.
#[must_use]
pub fn prepare(message: &[u8]) -> Vec<u8> {
    let mut normalized = Vec::with_capacity(message.len());
    let mut iter = message.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        if byte == b'\r' {
            if iter.peek() == Some(&b'\n') {
                iter.next();
            }
            normalized.push(b'\n');
        } else {
            normalized.push(byte);
        }
    }
    let content = normalized.strip_suffix(b"\n").unwrap_or(&normalized);

    let mut lines = content.split(|&b| b == b'\n').peekable();
    let mut in_headers = lines.peek().is_some_and(|first| starts_with_header(first));

    let mut out = Vec::with_capacity(content.len() + content.len() / 40 + 8);
    for line in lines {
        if in_headers && line.is_empty() {
            in_headers = false;
        }

        for chunk in split_long_line(line, in_headers) {
            if chunk.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(&chunk);
            out.extend_from_slice(b"\r\n");
        }
    }

    out
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

    fn prepared(message: &str) -> String {
        String::from_utf8(prepare(message.as_bytes())).unwrap()
    }

    #[test]
    fn test_normalizes_line_breaks() {
        assert_eq!(
            prepared("Subject: x\n\nline one\rline two\r\n"),
            "Subject: x\r\n\r\nline one\r\nline two\r\n"
        );
    }

    #[test]
    fn test_dot_stuffing() {
        let out = prepared("Subject: x\r\n\r\n.hello\r\n..twice\r\nmid.dot\r\n.\r\n");
        assert_eq!(
            out,
            "Subject: x\r\n\r\n..hello\r\n...twice\r\nmid.dot\r\n..\r\n"
        );

        // Removing one leading dot restores the original lines.
        let restored: Vec<_> = out
            .split("\r\n")
            .map(|l| l.strip_prefix('.').unwrap_or(l))
            .collect();
        assert_eq!(restored[2], ".hello");
        assert_eq!(restored[3], "..twice");
    }

    #[test]
    fn test_long_body_line_split_at_space() {
        let words = vec!["word"; 300].join(" ");
        let out = prepared(&format!("Subject: x\r\n\r\n{words}\r\n"));
        let body_lines: Vec<_> = out.split("\r\n").skip(2).filter(|l| !l.is_empty()).collect();
        assert!(body_lines.len() > 1);
        for line in &body_lines {
            assert!(line.len() <= MAX_LINE_LENGTH);
            assert!(!line.starts_with('\t'));
        }
        assert_eq!(body_lines.join(" "), words);
    }

    #[test]
    fn test_long_line_without_space_hard_split() {
        let long = "x".repeat(2500);
        let out = prepared(&format!("\r\n{long}\r\n"));
        let lines: Vec<_> = out.split("\r\n").collect();
        assert_eq!(lines[0], "");
        assert_eq!(lines[1].len(), 998);
        assert_eq!(lines[2].len(), 998);
        assert_eq!(lines[3].len(), 504);
    }

    #[test]
    fn test_long_header_continued_with_tab() {
        let value = vec!["token"; 250].join(" ");
        let out = prepared(&format!("X-Long: {value}\r\n\r\nbody\r\n"));
        let lines: Vec<_> = out.split("\r\n").collect();
        assert!(lines[0].starts_with("X-Long: "));
        assert!(lines[1].starts_with('\t'));
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE_LENGTH));
        assert!(out.ends_with("\r\n\r\nbody\r\n"));
    }

    #[test]
    fn test_header_detection() {
        assert!(starts_with_header(b"Date: today"));
        assert!(!starts_with_header(b"Not a header: value"));
        assert!(!starts_with_header(b"no colon"));
        assert!(!starts_with_header(b": empty name"));
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(prepare(b""), b"\r\n");
    }
}
