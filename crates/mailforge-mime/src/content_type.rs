//! MIME content type values.

use crate::encoding::CRLF;
use std::fmt;

/// Soft limit for a header line including the header name.
const FOLD_WIDTH: usize = 78;

/// Characters that force a parameter value to be quoted (RFC 2045 tspecials).
const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Parameter {
    key: String,
    value: String,
    quoted: bool,
}

/// MIME content type with ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    parameters: Vec<Parameter>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Parses a bare `type/subtype` string, falling back to
    /// `application/octet-stream` when it has no slash.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        mime.trim().split_once('/').map_or_else(
            || Self::new("application", "octet-stream"),
            |(main, sub)| Self::new(main.trim().to_lowercase(), sub.trim().to_lowercase()),
        )
    }

    /// Creates a text/plain content type.
    #[must_use]
    pub fn text_plain(charset: &str) -> Self {
        Self::new("text", "plain").with_parameter("charset", charset)
    }

    /// Creates a text/html content type.
    #[must_use]
    pub fn text_html(charset: &str) -> Self {
        Self::new("text", "html").with_parameter("charset", charset)
    }

    /// Creates a multipart/mixed content type with boundary.
    #[must_use]
    pub fn multipart_mixed(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "mixed").with_quoted_parameter("boundary", boundary)
    }

    /// Creates a multipart/alternative content type with boundary.
    #[must_use]
    pub fn multipart_alternative(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "alternative").with_quoted_parameter("boundary", boundary)
    }

    /// Creates a multipart/related content type with boundary.
    #[must_use]
    pub fn multipart_related(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "related").with_quoted_parameter("boundary", boundary)
    }

    /// Adds a parameter, quoted only when the value requires it.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            key: key.into(),
            value: value.into(),
            quoted: false,
        });
        self
    }

    /// Adds a parameter that is always quoted.
    #[must_use]
    pub fn with_quoted_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            key: key.into(),
            value: value.into(),
            quoted: true,
        });
        self
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Renders the value for a header named `header_name`, moving each
    /// parameter to its own continuation line when a single line would
    /// exceed 78 characters.
    #[must_use]
    pub fn folded(&self, header_name: &str) -> String {
        let single = self.to_string();
        if header_name.len() + 2 + single.len() <= FOLD_WIDTH {
            return single;
        }

        let mut result = format!("{}/{}", self.main_type, self.sub_type);
        for param in &self.parameters {
            result.push(';');
            result.push_str(CRLF);
            result.push(' ');
            result.push_str(&param.render());
        }
        result
    }
}

impl Parameter {
    fn render(&self) -> String {
        let needs_quotes = self.quoted
            || self.value.is_empty()
            || self
                .value
                .contains(|c: char| c.is_whitespace() || TSPECIALS.contains(c));

        if needs_quotes {
            let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("{}=\"{escaped}\"", self.key)
        } else {
            format!("{}={}", self.key, self.value)
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;

        for param in &self.parameters {
            write!(f, "; {}", param.render())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.to_string(), "text/plain");
    }

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain("utf-8");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_multipart_mixed() {
        let ct = ContentType::multipart_mixed("b1=_abc");
        assert_eq!(ct.boundary(), Some("b1=_abc"));
        assert!(ct.is_multipart());
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"b1=_abc\"");
    }

    #[test]
    fn test_from_mime() {
        let ct = ContentType::from_mime("Image/PNG");
        assert_eq!(ct.to_string(), "image/png");
        assert_eq!(
            ContentType::from_mime("garbage").to_string(),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_parameter_quoting() {
        let ct = ContentType::new("application", "pdf")
            .with_parameter("name", "my report.pdf")
            .with_parameter("format", "flowed");
        assert_eq!(
            ct.to_string(),
            "application/pdf; name=\"my report.pdf\"; format=flowed"
        );
    }

    #[test]
    fn test_folded_long_value() {
        let boundary = "b1=_".to_string() + &"f".repeat(64);
        let ct = ContentType::multipart_mixed(boundary.clone());
        let folded = ct.folded("Content-Type");
        assert_eq!(
            folded,
            format!("multipart/mixed;\r\n boundary=\"{boundary}\"")
        );

        let short = ContentType::text_plain("utf-8");
        assert_eq!(short.folded("Content-Type"), "text/plain; charset=utf-8");
    }
}
