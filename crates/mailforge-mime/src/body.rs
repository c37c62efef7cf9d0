//! MIME body construction.
//!
//! Turns a [`MessageSpec`] into the top-level `Content-Type` /
//! `Content-Transfer-Encoding` headers and the encoded body bytes. The
//! structure is picked from which parts are present; containers nest as
//! `multipart/mixed` around `multipart/related` around
//! `multipart/alternative`.

use crate::attachment::Attachment;
use crate::content_type::ContentType;
use crate::encoding::{
    CRLF, MAX_LINE_LENGTH, encode_base64_wrapped, encode_quoted_printable, has_8bit_chars,
    has_line_longer_than, normalize_breaks, normalize_breaks_bytes,
};
use crate::error::Result;
use crate::header::{CHARSET_ASCII, Headers, encode_header_text, secure_header};
use crate::id::Boundaries;
use crate::message::{MessageSpec, TransferEncoding};
use std::fmt;

/// First line of every multipart body, for readers without MIME support.
const PREAMBLE: &str = "This is a multi-part message in MIME format.";

/// Layout of the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeStructure {
    /// Single text part.
    Plain,
    /// `multipart/alternative`.
    Alt,
    /// `multipart/related`.
    Inline,
    /// `multipart/mixed`.
    Attach,
    /// `mixed` around `related`.
    InlineAttach,
    /// `related` around `alternative`.
    AltInline,
    /// `mixed` around `alternative`.
    AltAttach,
    /// `mixed` around `related` around `alternative`.
    AltInlineAttach,
}

impl MimeStructure {
    /// Picks the structure from which parts are present.
    #[must_use]
    pub const fn from_flags(has_alt: bool, has_inline: bool, has_attach: bool) -> Self {
        match (has_alt, has_inline, has_attach) {
            (false, false, false) => Self::Plain,
            (true, false, false) => Self::Alt,
            (false, true, false) => Self::Inline,
            (false, false, true) => Self::Attach,
            (false, true, true) => Self::InlineAttach,
            (true, true, false) => Self::AltInline,
            (true, false, true) => Self::AltAttach,
            (true, true, true) => Self::AltInlineAttach,
        }
    }

    /// Structure of a message spec.
    #[must_use]
    pub fn of(spec: &MessageSpec) -> Self {
        Self::from_flags(spec.has_alt_body(), spec.has_inline(), spec.has_attachment())
    }

    /// Whether a `multipart/alternative` level is present.
    #[must_use]
    pub const fn has_alt(self) -> bool {
        matches!(self, Self::Alt | Self::AltInline | Self::AltAttach | Self::AltInlineAttach)
    }

    /// Whether a `multipart/related` level is present.
    #[must_use]
    pub const fn has_inline(self) -> bool {
        matches!(self, Self::Inline | Self::InlineAttach | Self::AltInline | Self::AltInlineAttach)
    }

    /// Whether a `multipart/mixed` level is present.
    #[must_use]
    pub const fn has_attach(self) -> bool {
        matches!(self, Self::Attach | Self::InlineAttach | Self::AltAttach | Self::AltInlineAttach)
    }

    /// Number of multipart containers, which is also the number of
    /// boundaries used.
    #[must_use]
    pub fn depth(self) -> u8 {
        u8::from(self.has_alt()) + u8::from(self.has_inline()) + u8::from(self.has_attach())
    }
}

impl fmt::Display for MimeStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::Alt => "alt",
            Self::Inline => "inline",
            Self::Attach => "attach",
            Self::InlineAttach => "inline_attach",
            Self::AltInline => "alt_inline",
            Self::AltAttach => "alt_attach",
            Self::AltInlineAttach => "alt_inline_attach",
        };
        f.write_str(name)
    }
}

/// An encoded body with its top-level MIME headers.
#[derive(Debug, Clone)]
pub struct MimeBody {
    /// Structure the body was built with.
    pub structure: MimeStructure,
    /// `Content-Type` and, when needed, `Content-Transfer-Encoding`.
    pub headers: Headers,
    /// Encoded body.
    pub body: Vec<u8>,
}

impl MimeBody {
    /// Renders the top-level MIME headers as CRLF-terminated lines.
    #[must_use]
    pub fn header_lines(&self) -> String {
        self.headers.to_string()
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        headers: Headers,
        payload: Vec<u8>,
        encoding: TransferEncoding,
    },
    Multipart {
        content_type: ContentType,
        children: Vec<Self>,
    },
}

impl Node {
    /// Widest encoding used by any leaf below this node.
    fn widest_encoding(&self) -> TransferEncoding {
        match self {
            Self::Leaf { encoding, .. } => match encoding {
                TransferEncoding::Binary => TransferEncoding::Binary,
                TransferEncoding::EightBit => TransferEncoding::EightBit,
                _ => TransferEncoding::SevenBit,
            },
            Self::Multipart { children, .. } => children
                .iter()
                .map(Self::widest_encoding)
                .fold(TransferEncoding::SevenBit, |acc, enc| match (acc, enc) {
                    (TransferEncoding::Binary, _) | (_, TransferEncoding::Binary) => {
                        TransferEncoding::Binary
                    }
                    (TransferEncoding::EightBit, _) | (_, TransferEncoding::EightBit) => {
                        TransferEncoding::EightBit
                    }
                    _ => TransferEncoding::SevenBit,
                }),
        }
    }

    /// Headers describing a container part. Only identity encodings are
    /// ever declared on a container.
    fn container_headers(content_type: &ContentType, widest: TransferEncoding) -> Headers {
        let mut headers = Headers::new();
        headers.add("Content-Type", content_type.folded("Content-Type"));
        if widest != TransferEncoding::SevenBit {
            headers.add("Content-Transfer-Encoding", widest.to_string());
        }
        headers
    }

    /// Splits the outermost node into message headers and body.
    fn into_top_level(self) -> (Headers, Vec<u8>) {
        let widest = self.widest_encoding();
        match self {
            Self::Leaf { headers, payload, .. } => (headers, payload),
            Self::Multipart { content_type, children } => {
                let headers = Self::container_headers(&content_type, widest);
                let mut body = format!("{PREAMBLE}{CRLF}{CRLF}").into_bytes();
                write_children(&content_type, &children, &mut body);
                (headers, body)
            }
        }
    }

    /// Writes this node as a part inside a multipart body.
    fn write_part(&self, out: &mut Vec<u8>) {
        match self {
            Self::Leaf { headers, payload, .. } => {
                out.extend_from_slice(headers.to_string().as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
                out.extend_from_slice(payload);
            }
            Self::Multipart { content_type, children } => {
                let headers = Self::container_headers(content_type, self.widest_encoding());
                out.extend_from_slice(headers.to_string().as_bytes());
                out.extend_from_slice(CRLF.as_bytes());
                write_children(content_type, children, out);
            }
        }
    }
}

fn write_children(content_type: &ContentType, children: &[Node], out: &mut Vec<u8>) {
    let boundary = content_type.boundary().unwrap_or_default();
    for child in children {
        out.extend_from_slice(format!("--{boundary}{CRLF}").as_bytes());
        child.write_part(out);
        out.extend_from_slice(CRLF.as_bytes());
    }
    out.extend_from_slice(format!("--{boundary}--{CRLF}").as_bytes());
}

/// Picks the encoding and charset actually used for a text part.
///
/// 8bit text without any high-bit byte is sent as 7bit `us-ascii`; 7bit
/// text that does contain one is sent as quoted-printable; anything not
/// base64 with a line over 998 bytes is forced to quoted-printable.
#[must_use]
pub fn effective_encoding(
    text: &str,
    declared: TransferEncoding,
    charset: &str,
) -> (TransferEncoding, String) {
    let eight_bit = has_8bit_chars(text.as_bytes());
    let mut encoding = declared;
    let mut charset = charset.to_string();

    match declared {
        TransferEncoding::EightBit if !eight_bit => {
            encoding = TransferEncoding::SevenBit;
            charset = CHARSET_ASCII.to_string();
        }
        TransferEncoding::SevenBit if eight_bit => encoding = TransferEncoding::QuotedPrintable,
        _ => {}
    }

    if encoding != TransferEncoding::Base64 && has_line_longer_than(text, MAX_LINE_LENGTH) {
        encoding = TransferEncoding::QuotedPrintable;
    }

    (encoding, charset)
}

/// Encodes a payload with the given transfer encoding. Text encodings end
/// with CRLF.
#[must_use]
pub fn encode_payload(data: &[u8], encoding: TransferEncoding) -> Vec<u8> {
    match encoding {
        TransferEncoding::Base64 => encode_base64_wrapped(data).into_bytes(),
        TransferEncoding::QuotedPrintable => encode_quoted_printable(data).into_bytes(),
        TransferEncoding::SevenBit | TransferEncoding::EightBit => {
            let mut normalized = normalize_breaks_bytes(data);
            if !normalized.ends_with(b"\r\n") {
                normalized.extend_from_slice(b"\r\n");
            }
            normalized
        }
        TransferEncoding::Binary => data.to_vec(),
    }
}

fn text_leaf(text: &str, html: bool, declared: TransferEncoding, charset: &str) -> Node {
    let (encoding, charset) = effective_encoding(text, declared, charset);
    let content_type = if html {
        ContentType::text_html(&charset)
    } else {
        ContentType::text_plain(&charset)
    };

    let mut headers = Headers::new();
    headers.add("Content-Type", content_type.folded("Content-Type"));
    if encoding != TransferEncoding::SevenBit {
        headers.add("Content-Transfer-Encoding", encoding.to_string());
    }

    let normalized = normalize_breaks(text);
    Node::Leaf {
        headers,
        payload: encode_payload(normalized.as_bytes(), encoding),
        encoding,
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Part headers for an attachment.
#[must_use]
pub fn attachment_headers(attachment: &Attachment, charset: &str) -> Headers {
    let name = encode_header_text(&secure_header(attachment.name()), charset);

    let mut headers = Headers::new();
    headers.add(
        "Content-Type",
        attachment
            .content_type()
            .with_quoted_parameter("name", name.clone())
            .folded("Content-Type"),
    );
    headers.add("Content-Transfer-Encoding", attachment.encoding().to_string());
    if let Some(cid) = attachment.content_id() {
        headers.add("Content-ID", format!("<{}>", secure_header(cid)));
    }
    headers.add(
        "Content-Disposition",
        format!("{}; filename={}", attachment.disposition(), quote(&name)),
    );
    headers
}

fn attachment_leaf(attachment: &Attachment, charset: &str) -> Result<Node> {
    let data = attachment.read()?;
    Ok(Node::Leaf {
        headers: attachment_headers(attachment, charset),
        payload: encode_payload(&data, attachment.encoding()),
        encoding: attachment.encoding(),
    })
}

/// Builds the MIME body for a message spec.
///
/// # Errors
///
/// Returns [`BodyError::AttachmentUnreadable`](crate::BodyError::AttachmentUnreadable)
/// when an attachment file cannot be read.
pub fn build(spec: &MessageSpec, boundaries: &Boundaries) -> Result<MimeBody> {
    let structure = MimeStructure::of(spec);
    let mut level = structure.depth();

    let mut node = text_leaf(&spec.body, spec.is_html, spec.encoding, &spec.charset);

    if structure.has_alt() {
        let alt = spec.alt_body.as_deref().unwrap_or_default();
        let alt_leaf = text_leaf(alt, false, spec.encoding, &spec.charset);
        node = Node::Multipart {
            content_type: ContentType::multipart_alternative(boundaries.get(level)),
            children: vec![alt_leaf, node],
        };
        level -= 1;
    }

    if structure.has_inline() {
        let mut children = vec![node];
        for attachment in spec.attachments.iter().filter(|a| a.is_inline()) {
            children.push(attachment_leaf(attachment, &spec.charset)?);
        }
        node = Node::Multipart {
            content_type: ContentType::multipart_related(boundaries.get(level)),
            children,
        };
        level -= 1;
    }

    if structure.has_attach() {
        let mut children = vec![node];
        for attachment in spec.attachments.iter().filter(|a| !a.is_inline()) {
            children.push(attachment_leaf(attachment, &spec.charset)?);
        }
        node = Node::Multipart {
            content_type: ContentType::multipart_mixed(boundaries.get(level)),
            children,
        };
    }

    let (headers, body) = node.into_top_level();

    Ok(MimeBody {
        structure,
        headers,
        body,
    })
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
    use crate::attachment::Disposition;
    use crate::error::BodyError;

    fn spec(body: &str) -> MessageSpec {
        MessageSpec {
            body: body.into(),
            charset: "utf-8".into(),
            encoding: TransferEncoding::EightBit,
            ..MessageSpec::default()
        }
    }

    fn boundaries() -> Boundaries {
        Boundaries::from_id("test")
    }

    fn body_text(body: &MimeBody) -> String {
        String::from_utf8(body.body.clone()).unwrap()
    }

    #[test]
    fn test_structure_from_flags() {
        let cases = [
            ((false, false, false), MimeStructure::Plain),
            ((true, false, false), MimeStructure::Alt),
            ((false, true, false), MimeStructure::Inline),
            ((false, false, true), MimeStructure::Attach),
            ((false, true, true), MimeStructure::InlineAttach),
            ((true, true, false), MimeStructure::AltInline),
            ((true, false, true), MimeStructure::AltAttach),
            ((true, true, true), MimeStructure::AltInlineAttach),
        ];
        let mut seen = std::collections::HashSet::new();
        for ((alt, inline, attach), expected) in cases {
            let structure = MimeStructure::from_flags(alt, inline, attach);
            assert_eq!(structure, expected);
            assert_eq!(structure.has_alt(), alt);
            assert_eq!(structure.has_inline(), inline);
            assert_eq!(structure.has_attach(), attach);
            assert!(seen.insert(structure));
        }
        assert_eq!(MimeStructure::AltInlineAttach.depth(), 3);
        assert_eq!(MimeStructure::AltInlineAttach.to_string(), "alt_inline_attach");
    }

    #[test]
    fn test_plain_ascii_downgraded() {
        let body = build(&spec("Hello\nworld"), &boundaries()).unwrap();
        assert_eq!(body.structure, MimeStructure::Plain);
        assert_eq!(
            body.header_lines(),
            "Content-Type: text/plain; charset=us-ascii\r\n"
        );
        assert!(!body.headers.contains("Content-Transfer-Encoding"));
        assert_eq!(body_text(&body), "Hello\r\nworld\r\n");
    }

    #[test]
    fn test_plain_8bit_kept() {
        let body = build(&spec("Grüße"), &boundaries()).unwrap();
        assert_eq!(body.headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
        assert_eq!(body.headers.get("Content-Transfer-Encoding"), Some("8bit"));
        assert_eq!(body.body, "Grüße\r\n".as_bytes());
    }

    #[test]
    fn test_html_content_type() {
        let mut s = spec("<p>hi</p>");
        s.is_html = true;
        let body = build(&s, &boundaries()).unwrap();
        assert_eq!(body.headers.get("Content-Type"), Some("text/html; charset=us-ascii"));
    }

    #[test]
    fn test_long_line_forces_quoted_printable() {
        let long = "a".repeat(1200);
        let body = build(&spec(&long), &boundaries()).unwrap();
        assert_eq!(
            body.headers.get("Content-Transfer-Encoding"),
            Some("quoted-printable")
        );
        for line in body_text(&body).split("\r\n") {
            assert!(line.len() <= 76);
        }
    }

    #[test]
    fn test_seven_bit_with_8bit_content_upgraded() {
        let mut s = spec("café");
        s.encoding = TransferEncoding::SevenBit;
        let body = build(&s, &boundaries()).unwrap();
        assert_eq!(
            body.headers.get("Content-Transfer-Encoding"),
            Some("quoted-printable")
        );
        assert_eq!(body_text(&body), "caf=C3=A9\r\n");
    }

    #[test]
    fn test_base64_body() {
        let mut s = spec("hi");
        s.encoding = TransferEncoding::Base64;
        let body = build(&s, &boundaries()).unwrap();
        assert_eq!(body.headers.get("Content-Transfer-Encoding"), Some("base64"));
        assert_eq!(body_text(&body), "aGk=\r\n");
    }

    #[test]
    fn test_alternative_layout() {
        let mut s = spec("<p>Hello</p>");
        s.is_html = true;
        s.alt_body = Some("Hello".into());
        let body = build(&s, &boundaries()).unwrap();

        assert_eq!(body.structure, MimeStructure::Alt);
        assert_eq!(
            body.headers.get("Content-Type"),
            Some("multipart/alternative; boundary=\"b1=_test\"")
        );
        assert!(!body.headers.contains("Content-Transfer-Encoding"));
        assert_eq!(
            body_text(&body),
            "This is a multi-part message in MIME format.\r\n\
             \r\n\
             --b1=_test\r\n\
             Content-Type: text/plain; charset=us-ascii\r\n\
             \r\n\
             Hello\r\n\
             \r\n\
             --b1=_test\r\n\
             Content-Type: text/html; charset=us-ascii\r\n\
             \r\n\
             <p>Hello</p>\r\n\
             \r\n\
             --b1=_test--\r\n"
        );
    }

    #[test]
    fn test_container_declares_8bit_only_when_used() {
        let mut s = spec("<p>Grüße</p>");
        s.is_html = true;
        s.alt_body = Some("Gruesse".into());
        let body = build(&s, &boundaries()).unwrap();
        assert_eq!(body.headers.get("Content-Transfer-Encoding"), Some("8bit"));

        let mut s = spec("<p>Grüße</p>");
        s.is_html = true;
        s.encoding = TransferEncoding::QuotedPrintable;
        s.alt_body = Some("Grüße".into());
        let body = build(&s, &boundaries()).unwrap();
        assert!(!body.headers.contains("Content-Transfer-Encoding"));
        assert!(body_text(&body).contains("Content-Transfer-Encoding: quoted-printable\r\n"));
    }

    #[test]
    fn test_full_nesting_order() {
        let mut s = spec("<p><img src=\"cid:logo\"></p>");
        s.is_html = true;
        s.alt_body = Some("text".into());
        s.attachments = vec![
            Attachment::inline("logo", "logo.png", vec![0x89, b'P', b'N', b'G']),
            Attachment::from_bytes("notes.txt", b"notes".to_vec()),
        ];
        let body = build(&s, &boundaries()).unwrap();
        let text = body_text(&body);

        assert_eq!(body.structure, MimeStructure::AltInlineAttach);
        assert!(
            body.headers
                .get("Content-Type")
                .unwrap()
                .starts_with("multipart/mixed")
        );

        let related = text.find("Content-Type: multipart/related;").unwrap();
        let alternative = text.find("Content-Type: multipart/alternative;").unwrap();
        let inline = text.find("Content-ID: <logo>").unwrap();
        let attachment = text.find("filename=\"notes.txt\"").unwrap();
        assert!(related < alternative);
        assert!(alternative < inline);
        assert!(inline < attachment);

        assert!(text.contains("boundary=\"b2=_test\""));
        assert!(text.contains("boundary=\"b3=_test\""));
        assert!(text.contains("--b3=_test--\r\n"));
        assert!(text.contains("--b2=_test--\r\n"));
        assert!(text.ends_with("--b1=_test--\r\n"));
    }

    #[test]
    fn test_inline_only_uses_related() {
        let mut s = spec("<img src=\"cid:pic\">");
        s.is_html = true;
        s.attachments = vec![Attachment::inline("pic", "pic.gif", vec![1, 2])];
        let body = build(&s, &boundaries()).unwrap();
        assert_eq!(body.structure, MimeStructure::Inline);
        assert_eq!(
            body.headers.get("Content-Type"),
            Some("multipart/related; boundary=\"b1=_test\"")
        );
    }

    #[test]
    fn test_attachment_part_headers() {
        let att = Attachment::from_bytes("report.pdf", vec![1, 2, 3]);
        let headers = attachment_headers(&att, "utf-8");
        assert_eq!(
            headers.get("Content-Type"),
            Some("application/pdf; name=\"report.pdf\"")
        );
        assert_eq!(headers.get("Content-Transfer-Encoding"), Some("base64"));
        assert!(!headers.contains("Content-ID"));
        assert_eq!(
            headers.get("Content-Disposition"),
            Some("attachment; filename=\"report.pdf\"")
        );

        let inline = Attachment::from_bytes("a.png", vec![0]).with_disposition(Disposition::Inline);
        let headers = attachment_headers(&inline, "utf-8");
        assert_eq!(headers.get("Content-ID"), Some("<a.png>"));
        assert_eq!(
            headers.get("Content-Disposition"),
            Some("inline; filename=\"a.png\"")
        );
    }

    #[test]
    fn test_attachment_name_encoded() {
        let att = Attachment::from_bytes("résumé.txt", b"cv".to_vec());
        let headers = attachment_headers(&att, "utf-8");
        let disposition = headers.get("Content-Disposition").unwrap();
        assert!(disposition.starts_with("attachment; filename=\"=?utf-8?"));
        assert!(!disposition.contains('é'));
    }

    #[test]
    fn test_attachment_base64_lines() {
        let mut s = spec("see attached");
        s.attachments = vec![Attachment::from_bytes("data.bin", vec![0xAB; 300])];
        let body = build(&s, &boundaries()).unwrap();
        let text = body_text(&body);
        let payload_start = text.find("filename=\"data.bin\"\r\n\r\n").unwrap();
        let payload = &text[payload_start..];
        for line in payload.lines().skip(2).take_while(|l| !l.is_empty()) {
            assert!(line.len() <= 76);
        }
    }

    #[test]
    fn test_unreadable_attachment() {
        let mut s = spec("body");
        s.attachments = vec![Attachment::from_file("/nonexistent/mailforge/x.pdf")];
        assert!(matches!(
            build(&s, &boundaries()),
            Err(BodyError::AttachmentUnreadable { .. })
        ));
    }

    #[test]
    fn test_payload_encodings() {
        assert_eq!(encode_payload(b"a\nb", TransferEncoding::SevenBit), b"a\r\nb\r\n");
        assert_eq!(encode_payload(b"a\r\n", TransferEncoding::EightBit), b"a\r\n");
        assert_eq!(encode_payload(&[0, 1, 2], TransferEncoding::Binary), vec![0, 1, 2]);
        assert_eq!(encode_payload(b"abc", TransferEncoding::Base64), b"YWJj\r\n");
    }

    #[test]
    fn test_effective_encoding() {
        assert_eq!(
            effective_encoding("plain", TransferEncoding::EightBit, "utf-8"),
            (TransferEncoding::SevenBit, "us-ascii".to_string())
        );
        assert_eq!(
            effective_encoding("naïve", TransferEncoding::EightBit, "utf-8"),
            (TransferEncoding::EightBit, "utf-8".to_string())
        );
        let long = "x".repeat(999);
        assert_eq!(
            effective_encoding(&long, TransferEncoding::Base64, "utf-8").0,
            TransferEncoding::Base64
        );
    }
}
