//! Header encoding (RFC 2047) and header block assembly.
//!
//! Header values are only wrapped in encoded words when they must be:
//! plain ASCII stays readable, mostly-ASCII text uses Q-encoding and
//! text with many 8-bit characters uses B-encoding.

use crate::address::is_atext;
use crate::encoding::{CRLF, MAX_LINE_LENGTH, encode_base64, has_8bit_chars};
use std::fmt::{self, Write as _};

/// Maximum length of a single encoded word (RFC 2047 section 2).
pub const ENCODED_WORD_MAX: usize = 75;

/// Smallest encoded-word payload, enough for one fully escaped character.
const MIN_WORD_PAYLOAD: usize = 12;

/// Charset used for header text that has no 8-bit bytes.
pub const CHARSET_ASCII: &str = "us-ascii";

/// Where the text is placed in a header, which decides the set of
/// characters allowed to appear unencoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Unstructured text such as `Subject`.
    Text,
    /// A display name in an address (RFC 2047 section 5.3).
    Phrase,
}

/// Strips every CR and LF from a value destined for a header and trims it.
///
/// Must be applied to any user-controlled value before it reaches a header
/// line, otherwise a value could inject extra headers.
#[must_use]
pub fn secure_header(text: &str) -> String {
    text.chars()
        .filter(|&c| c != '\r' && c != '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Encodes unstructured header text such as a subject.
#[must_use]
pub fn encode_header_text(text: &str, charset: &str) -> String {
    encode(text, charset, Position::Text)
}

/// Encodes a display-name phrase.
///
/// ASCII names made of atoms are returned as-is; other ASCII names are
/// returned as a quoted string with `"` and `\` escaped.
#[must_use]
pub fn encode_phrase(text: &str, charset: &str) -> String {
    encode(text, charset, Position::Phrase)
}

fn encode(text: &str, charset: &str, position: Position) -> String {
    let bytes = text.as_bytes();

    let escape_count = match position {
        Position::Phrase => {
            if !has_8bit_chars(bytes) && !bytes.iter().any(|&b| is_control(b)) {
                return quote_phrase(text);
            }
            bytes
                .iter()
                .filter(|&&b| !matches!(b, b' ' | b'!' | b'#'..=b'[' | b']'..=b'~'))
                .count()
        }
        Position::Text => bytes.iter().filter(|&&b| is_control(b) || b >= 0x80).count(),
    };

    let charset = if has_8bit_chars(bytes) { charset } else { CHARSET_ASCII };
    // "=?" + charset + "?X?" + "?="
    let overhead = 7 + charset.len();
    let header_budget = MAX_LINE_LENGTH.saturating_sub(overhead);
    let word_budget = ENCODED_WORD_MAX.saturating_sub(overhead).max(MIN_WORD_PAYLOAD);

    // More than a third needs escaping: B is shorter. Otherwise Q, which is
    // also used for over-long plain text so it can be split into words.
    let use_b = escape_count * 3 > bytes.len();
    if !use_b && escape_count == 0 && bytes.len() <= header_budget {
        return text.to_string();
    }

    let (encoding, words) = if use_b {
        ('B', b_encode_words(text, word_budget))
    } else {
        ('Q', q_encode_words(text, word_budget, position))
    };

    words
        .iter()
        .map(|payload| format!("=?{charset}?{encoding}?{payload}?="))
        .collect::<Vec<_>>()
        .join(&format!("{CRLF} "))
}

const fn is_control(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F | 0x7F)
}

fn quote_phrase(text: &str) -> String {
    if text.bytes().all(|b| is_atext(b) || b == b' ') {
        return text.to_string();
    }

    let mut quoted = String::with_capacity(text.len() + 4);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Splits `text` into Base64 payloads of at most `budget` characters,
/// cutting only on character boundaries.
fn b_encode_words(text: &str, budget: usize) -> Vec<String> {
    // Largest number of raw bytes whose Base64 form fits the budget.
    let max_bytes = (budget / 4 * 3).max(3);
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for (idx, ch) in text.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > max_bytes && end > start {
            words.push(encode_base64(&text.as_bytes()[start..end]));
            start = end;
        }
        end = next;
    }

    if end > start || words.is_empty() {
        words.push(encode_base64(&text.as_bytes()[start..end]));
    }

    words
}

/// Splits `text` into Q-encoded payloads of at most `budget` characters.
///
/// Each character becomes one token (itself, `_` for space, or the `=XX`
/// escapes of all its bytes), so a payload never ends inside an escape or a
/// multibyte sequence.
fn q_encode_words(text: &str, budget: usize, position: Position) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        let token = q_token(ch, position);
        if !current.is_empty() && current.len() + token.len() > budget {
            words.push(std::mem::take(&mut current));
        }
        current.push_str(&token);
    }

    if !current.is_empty() || words.is_empty() {
        words.push(current);
    }

    words
}

fn q_token(ch: char, position: Position) -> String {
    if ch == ' ' {
        return "_".to_string();
    }

    let allowed = match position {
        Position::Text => ch.is_ascii_graphic() && !matches!(ch, '=' | '?' | '_'),
        Position::Phrase => ch.is_ascii_alphanumeric() || matches!(ch, '!' | '*' | '+' | '-' | '/'),
    };
    if allowed {
        return ch.to_string();
    }

    let mut buf = [0u8; 4];
    let mut token = String::with_capacity(12);
    for byte in ch.encode_utf8(&mut buf).bytes() {
        let _ = write!(token, "={byte:02X}");
    }
    token
}

/// Ordered collection of header lines.
///
/// Values are stored as rendered (already encoded and folded); insertion
/// order is the wire order.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Appends every header of `other`.
    pub fn extend(&mut self, other: Self) {
        self.headers.extend(other.headers);
    }

    /// Gets the first value for a header (case-insensitive name).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns true if a header with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}{CRLF}")?;
        }
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
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use proptest::prelude::*;

    fn decode_words(encoded: &str) -> String {
        let mut bytes = Vec::new();
        for word in encoded.split("\r\n ") {
            let inner = word.strip_prefix("=?").unwrap().strip_suffix("?=").unwrap();
            let mut parts = inner.splitn(3, '?');
            let _charset = parts.next().unwrap();
            let encoding = parts.next().unwrap();
            let payload = parts.next().unwrap();
            if encoding == "B" {
                bytes.extend(STANDARD.decode(payload).unwrap());
            } else {
                let payload = payload.as_bytes();
                let mut i = 0;
                while i < payload.len() {
                    match payload[i] {
                        b'_' => bytes.push(b' '),
                        b'=' => {
                            let hex = std::str::from_utf8(&payload[i + 1..i + 3]).unwrap();
                            bytes.push(u8::from_str_radix(hex, 16).unwrap());
                            i += 2;
                        }
                        b => bytes.push(b),
                    }
                    i += 1;
                }
            }
        }
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_secure_header_strips_breaks() {
        assert_eq!(
            secure_header("Hello\r\nBcc: victim@example.com"),
            "HelloBcc: victim@example.com"
        );
        assert_eq!(secure_header("  padded\n"), "padded");
    }

    #[test]
    fn test_ascii_text_unchanged() {
        assert_eq!(encode_header_text("Quarterly report", "utf-8"), "Quarterly report");
    }

    #[test]
    fn test_mostly_ascii_uses_q() {
        let encoded = encode_header_text("Café menu for today", "utf-8");
        assert_eq!(encoded, "=?utf-8?Q?Caf=C3=A9_menu_for_today?=");
    }

    #[test]
    fn test_mostly_non_ascii_uses_b() {
        let encoded = encode_header_text("Привет мир", "utf-8");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert_eq!(decode_words(&encoded), "Привет мир");
    }

    #[test]
    fn test_q_escapes_equals_once() {
        let encoded = encode_header_text("a=b é", "utf-8");
        assert_eq!(encoded, "=?utf-8?Q?a=3Db_=C3=A9?=");
    }

    #[test]
    fn test_long_ascii_forced_to_q() {
        let text = "a".repeat(MAX_LINE_LENGTH);
        let encoded = encode_header_text(&text, "utf-8");
        assert!(encoded.starts_with("=?us-ascii?Q?"));
        assert_eq!(decode_words(&encoded), text);
    }

    #[test]
    fn test_b_words_split_on_char_boundaries() {
        let text = "日本語のテキスト".repeat(10);
        let encoded = encode_header_text(&text, "utf-8");
        assert!(encoded.contains("\r\n "));
        for word in encoded.split("\r\n ") {
            assert!(word.len() <= ENCODED_WORD_MAX, "{word}");
            // Each word decodes on its own.
            decode_words(word);
        }
        assert_eq!(decode_words(&encoded), text);
    }

    #[test]
    fn test_overlong_charset_still_encodes() {
        let charset = "x-".repeat(40);
        let encoded = encode_header_text("Café menu for today", &charset);
        assert!(encoded.starts_with(&format!("=?{charset}?Q?")));
        assert_eq!(decode_words(&encoded), "Café menu for today");

        let encoded = encode_phrase("Привет", &charset);
        assert_eq!(decode_words(&encoded), "Привет");
    }

    #[test]
    fn test_phrase_atoms_unquoted() {
        assert_eq!(encode_phrase("John Doe", "utf-8"), "John Doe");
    }

    #[test]
    fn test_phrase_specials_quoted() {
        assert_eq!(encode_phrase("Doe, John", "utf-8"), "\"Doe, John\"");
        assert_eq!(encode_phrase("Say \"hi\"", "utf-8"), "\"Say \\\"hi\\\"\"");
    }

    #[test]
    fn test_phrase_non_ascii_q() {
        let encoded = encode_phrase("José Martin", "utf-8");
        assert_eq!(encoded, "=?utf-8?Q?Jos=C3=A9_Martin?=");
        assert_eq!(decode_words(&encoded), "José Martin");
    }

    #[test]
    fn test_headers_ordered_display() {
        let mut headers = Headers::new();
        headers.add("From", "a@example.com");
        headers.add("To", "b@example.com");
        headers.add("X-Tag", "one");
        headers.add("X-Tag", "two");

        assert_eq!(
            headers.to_string(),
            "From: a@example.com\r\nTo: b@example.com\r\nX-Tag: one\r\nX-Tag: two\r\n"
        );
        assert_eq!(headers.get("x-tag"), Some("one"));
        assert_eq!(headers.get_all("X-TAG"), vec!["one", "two"]);
        assert_eq!(headers.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_secure_header_removes_breaks(s in ".*") {
            let secured = secure_header(&s);
            prop_assert!(!secured.contains('\r'));
            prop_assert!(!secured.contains('\n'));
        }

        #[test]
        fn prop_encoded_text_decodes(s in "\\PC{1,120}") {
            let encoded = encode_header_text(&s, "utf-8");
            if encoded.starts_with("=?") && encoded != s {
                prop_assert_eq!(decode_words(&encoded), s);
            }
        }

        #[test]
        fn prop_ascii_printable_never_wrapped(s in "[ -~]{0,200}") {
            prop_assert_eq!(encode_header_text(&s, "utf-8"), s);
        }
    }
}
