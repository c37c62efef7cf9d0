//! Transfer-encoding primitives and line wrapping.
//!
//! Base64 and Quoted-Printable (RFC 2045) body encoders, line-break
//! normalisation and the word wrapper shared by bodies and headers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Line terminator used on the wire.
pub const CRLF: &str = "\r\n";

/// Maximum line length excluding CRLF (RFC 2822 section 2.1.1).
pub const MAX_LINE_LENGTH: usize = 998;

/// Line length used for Base64 and Quoted-Printable bodies.
pub const STD_LINE_LENGTH: usize = 76;

/// Encodes data as Base64 without line breaks.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-terminated lines of
/// [`STD_LINE_LENGTH`] characters.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / STD_LINE_LENGTH * 2 + 2);

    // Base64 output is pure ASCII, so byte chunks are always valid UTF-8.
    for chunk in encoded.as_bytes().chunks(STD_LINE_LENGTH) {
        result.extend(chunk.iter().map(|&b| char::from(b)));
        result.push_str(CRLF);
    }

    result
}

/// Returns true if any byte has the high bit set.
#[must_use]
pub fn has_8bit_chars(data: &[u8]) -> bool {
    data.iter().any(|&b| b >= 0x80)
}

/// Returns true if any line (excluding its line break) is longer than `max` bytes.
#[must_use]
pub fn has_line_longer_than(text: &str, max: usize) -> bool {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .any(|line| line.len() > max)
}

/// Converts every `\r\n`, lone `\r` and lone `\n` to CRLF.
#[must_use]
pub fn normalize_breaks(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 40);
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                result.push_str(CRLF);
            }
            '\n' => result.push_str(CRLF),
            _ => result.push(ch),
        }
    }

    result
}

/// Byte-level variant of [`normalize_breaks`] for attachment payloads.
#[must_use]
pub fn normalize_breaks_bytes(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + data.len() / 40);
    let mut iter = data.iter().copied().peekable();

    while let Some(byte) = iter.next() {
        match byte {
            b'\r' => {
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
                result.extend_from_slice(b"\r\n");
            }
            b'\n' => result.extend_from_slice(b"\r\n"),
            _ => result.push(byte),
        }
    }

    result
}

/// Wraps text to `width`, returning CRLF-terminated lines.
///
/// Existing line breaks are kept (a single trailing break is dropped before
/// wrapping). In plain mode words are packed greedily and a line break
/// replaces the space between them; a word longer than `width` is left
/// intact. `width` is measured in characters.
///
/// In quoted-printable mode the input is expected to be already escaped.
/// Lines longer than `width` bytes are split with a `=` soft break; the cut
/// prefers the last space within budget (the space stays before the `=`),
/// otherwise it falls mid-word but never inside an `=XX` escape or inside
/// an escaped UTF-8 multibyte sequence. Every output line, including its
/// soft break, fits in `width`.
#[must_use]
pub fn wrap_text(message: &str, width: usize, quoted_printable: bool) -> String {
    let normalized = normalize_breaks(message);
    let text = normalized.strip_suffix(CRLF).unwrap_or(&normalized);
    let mut result = String::with_capacity(text.len() + text.len() / width.max(1) * 3 + 2);

    for line in text.split(CRLF) {
        if quoted_printable {
            wrap_line_qp(line, width.max(4), &mut result);
        } else {
            wrap_line_plain(line, width.max(1), &mut result);
        }
    }

    result
}

fn wrap_line_plain(line: &str, width: usize, out: &mut String) {
    let mut buf = String::new();
    let mut buf_len = 0;

    for (i, word) in line.split(' ').enumerate() {
        let word_len = word.chars().count();
        if i == 0 {
            buf.push_str(word);
            buf_len = word_len;
        } else if buf_len > 0 && buf_len + 1 + word_len > width {
            out.push_str(&buf);
            out.push_str(CRLF);
            buf.clear();
            buf.push_str(word);
            buf_len = word_len;
        } else {
            buf.push(' ');
            buf.push_str(word);
            buf_len += 1 + word_len;
        }
    }

    out.push_str(&buf);
    out.push_str(CRLF);
}

fn wrap_line_qp(line: &str, width: usize, out: &mut String) {
    let mut rest = line;

    while rest.len() > width {
        // Room for the trailing '=' of the soft break.
        let budget = width - 1;
        let cut = match rest.as_bytes()[..budget].iter().rposition(|&b| b == b' ') {
            Some(pos) if pos > 0 => pos + 1,
            _ => qp_cut_point(rest, budget),
        };

        out.push_str(&rest[..cut]);
        out.push('=');
        out.push_str(CRLF);
        rest = &rest[cut..];
    }

    out.push_str(rest);
    out.push_str(CRLF);
}

/// Finds a cut point at or before `budget` that does not split an `=XX`
/// escape, an escaped UTF-8 sequence, or a raw UTF-8 character.
fn qp_cut_point(text: &str, budget: usize) -> usize {
    let bytes = text.as_bytes();
    let mut cut = budget.min(bytes.len());

    if cut >= 1 && bytes[cut - 1] == b'=' {
        cut -= 1;
    } else if cut >= 2 && bytes[cut - 2] == b'=' {
        cut -= 2;
    }

    // Back up while the escape at the cut encodes a continuation byte.
    while cut >= 3 && bytes[cut - 3] == b'=' && escaped_byte(&bytes[cut..]).is_some_and(is_continuation) {
        cut -= 3;
    }

    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }

    if cut == 0 {
        // Always make progress: take one escape or one character.
        cut = if bytes[0] == b'=' {
            3.min(bytes.len())
        } else {
            text.chars().next().map_or(1, char::len_utf8)
        };
    }

    cut
}

fn escaped_byte(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 3 || bytes[0] != b'=' {
        return None;
    }
    let hex = std::str::from_utf8(&bytes[1..3]).ok()?;
    u8::from_str_radix(hex, 16).ok()
}

const fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Encodes data using Quoted-Printable encoding (RFC 2045 section 6.7).
///
/// Line breaks in the input are treated as hard breaks and emitted as CRLF.
/// Whitespace at the end of a line is escaped, and the result is wrapped to
/// [`STD_LINE_LENGTH`] with soft breaks.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut escaped = String::with_capacity(data.len() * 3 / 2);

    // The final terminator, if any, is left for `wrap_text` to drop.
    for (i, line) in data.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            escaped.push_str(CRLF);
        }
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        for (j, &byte) in line.iter().enumerate() {
            let at_end = j + 1 == line.len();
            match byte {
                b'!'..=b'<' | b'>'..=b'~' => escaped.push(char::from(byte)),
                b' ' | b'\t' if !at_end => escaped.push(char::from(byte)),
                _ => {
                    let _ = write!(escaped, "={byte:02X}");
                }
            }
        }
    }

    wrap_text(&escaped, STD_LINE_LENGTH, true)
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
    use base64::Engine;

    #[test]
    fn test_base64_wrapped_lines() {
        let data = vec![b'x'; 100];
        let encoded = encode_base64_wrapped(&data);
        let lines: Vec<&str> = encoded.split(CRLF).collect();
        assert_eq!(lines[0].len(), STD_LINE_LENGTH);
        assert!(encoded.ends_with(CRLF));

        let joined: String = lines.concat();
        assert_eq!(STANDARD.decode(joined).unwrap(), data);
    }

    #[test]
    fn test_has_8bit_chars() {
        assert!(!has_8bit_chars(b"plain ascii"));
        assert!(has_8bit_chars("Héllo".as_bytes()));
    }

    #[test]
    fn test_has_line_longer_than() {
        let ok = format!("{}\r\nshort", "a".repeat(MAX_LINE_LENGTH));
        assert!(!has_line_longer_than(&ok, MAX_LINE_LENGTH));

        let long = format!("short\n{}", "a".repeat(MAX_LINE_LENGTH + 1));
        assert!(has_line_longer_than(&long, MAX_LINE_LENGTH));
    }

    #[test]
    fn test_normalize_breaks() {
        assert_eq!(normalize_breaks("a\nb\r\nc\rd"), "a\r\nb\r\nc\r\nd");
        assert_eq!(normalize_breaks_bytes(b"a\nb\rc"), b"a\r\nb\r\nc");
    }

    #[test]
    fn test_wrap_plain_packs_words() {
        let wrapped = wrap_text("the quick brown fox jumps", 10, false);
        assert_eq!(wrapped, "the quick\r\nbrown fox\r\njumps\r\n");
    }

    #[test]
    fn test_wrap_plain_keeps_existing_breaks_and_long_words() {
        let wrapped = wrap_text("one\ntwo averyveryverylongword\n", 8, false);
        assert_eq!(wrapped, "one\r\ntwo\r\naveryveryverylongword\r\n");
    }

    #[test]
    fn test_wrap_qp_line_budget() {
        let text = "word ".repeat(40);
        let wrapped = wrap_text(&text, STD_LINE_LENGTH, true);
        for line in wrapped.split(CRLF).filter(|l| !l.is_empty()) {
            assert!(line.len() <= STD_LINE_LENGTH, "line too long: {line}");
        }
        assert!(wrapped.contains(" =\r\n"));
    }

    #[test]
    fn test_wrap_qp_never_splits_escape() {
        let text = "=C3=A9".repeat(30);
        let wrapped = wrap_text(&text, 20, true);
        for line in wrapped.split(CRLF).filter(|l| !l.is_empty()) {
            let content = line.strip_suffix('=').unwrap_or(line);
            // Each line starts on a lead byte and holds whole characters.
            assert!(content.starts_with("=C3"), "bad split: {line}");
            assert_eq!(content.len() % 6, 0, "bad split: {line}");
        }
    }

    #[test]
    fn test_quoted_printable_ascii_passthrough() {
        assert_eq!(encode_quoted_printable(b"Hello, World!"), "Hello, World!\r\n");
    }

    #[test]
    fn test_quoted_printable_escapes() {
        let encoded = encode_quoted_printable("Héllo a=b".as_bytes());
        assert_eq!(encoded, "H=C3=A9llo a=3Db\r\n");
    }

    #[test]
    fn test_quoted_printable_trailing_whitespace() {
        let encoded = encode_quoted_printable(b"trailing \nnext\t\n");
        assert_eq!(encoded, "trailing=20\r\nnext=09\r\n");
    }

    #[test]
    fn test_quoted_printable_keeps_trailing_blank_lines() {
        assert_eq!(encode_quoted_printable("café\n\n".as_bytes()), "caf=C3=A9\r\n\r\n");
        assert_eq!(
            encode_quoted_printable("café\r\n\r\n\r\n".as_bytes()),
            "caf=C3=A9\r\n\r\n\r\n"
        );
        assert_eq!(encode_quoted_printable(b"one\n"), "one\r\n");
    }

    #[test]
    fn test_quoted_printable_long_line_soft_breaks() {
        let text = "x".repeat(200);
        let encoded = encode_quoted_printable(text.as_bytes());
        assert!(encoded.split(CRLF).all(|l| l.len() <= STD_LINE_LENGTH));
        assert_eq!(encoded.replace("=\r\n", "").trim_end(), text);
    }
}
