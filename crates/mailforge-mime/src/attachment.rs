//! Message attachments.

use crate::content_type::ContentType;
use crate::error::{BodyError, Result};
use crate::message::TransferEncoding;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the attachment payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Read from disk when the body is built.
    File(PathBuf),
    /// Held in memory.
    Bytes(Vec<u8>),
}

/// `Content-Disposition` of an attachment part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Referenced from the HTML body by `cid:`.
    Inline,
    /// Regular attachment.
    #[default]
    Attachment,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Attachment => write!(f, "attachment"),
        }
    }
}

/// A file or in-memory payload attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    source: AttachmentSource,
    name: String,
    mime_type: String,
    encoding: TransferEncoding,
    disposition: Disposition,
    content_id: Option<String>,
}

impl Attachment {
    /// Attaches a file. The name defaults to the file name and the MIME type
    /// is guessed from the extension.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = guess_mime(&path);
        Self {
            source: AttachmentSource::File(path),
            name,
            mime_type,
            encoding: TransferEncoding::Base64,
            disposition: Disposition::Attachment,
            content_id: None,
        }
    }

    /// Attaches an in-memory payload under `name`.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let mime_type = guess_mime(Path::new(&name));
        Self {
            source: AttachmentSource::Bytes(bytes.into()),
            name,
            mime_type,
            encoding: TransferEncoding::Base64,
            disposition: Disposition::Attachment,
            content_id: None,
        }
    }

    /// Embeds an in-memory payload for reference from HTML as `cid:{content_id}`.
    #[must_use]
    pub fn inline(
        content_id: impl Into<String>,
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self::from_bytes(name, bytes)
            .with_disposition(Disposition::Inline)
            .with_content_id(content_id)
    }

    /// Overrides the declared name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the transfer encoding used for the payload.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: TransferEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the disposition.
    #[must_use]
    pub const fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Sets the `Content-ID`.
    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload source.
    #[must_use]
    pub const fn source(&self) -> &AttachmentSource {
        &self.source
    }

    /// MIME type as a content type value.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        ContentType::from_mime(&self.mime_type)
    }

    /// Transfer encoding of the payload.
    #[must_use]
    pub const fn encoding(&self) -> TransferEncoding {
        self.encoding
    }

    /// Disposition.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Returns true for inline parts.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.disposition == Disposition::Inline
    }

    /// `Content-ID` for inline parts; defaults to the declared name.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> {
        match self.disposition {
            Disposition::Inline => Some(self.content_id.as_deref().unwrap_or(&self.name)),
            Disposition::Attachment => None,
        }
    }

    /// Reads the payload.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError::AttachmentUnreadable`] if the file cannot be read.
    pub fn read(&self) -> Result<Cow<'_, [u8]>> {
        match &self.source {
            AttachmentSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            AttachmentSource::File(path) => std::fs::read(path).map(Cow::Owned).map_err(|source| {
                BodyError::AttachmentUnreadable {
                    name: self.name.clone(),
                    path: path.clone(),
                    source,
                }
            }),
        }
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
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

    #[test]
    fn test_from_bytes_defaults() {
        let att = Attachment::from_bytes("report.pdf", b"%PDF".to_vec());
        assert_eq!(att.name(), "report.pdf");
        assert_eq!(att.content_type().to_string(), "application/pdf");
        assert_eq!(att.encoding(), TransferEncoding::Base64);
        assert_eq!(att.disposition(), Disposition::Attachment);
        assert_eq!(att.content_id(), None);
        assert_eq!(att.read().unwrap().as_ref(), b"%PDF");
    }

    #[test]
    fn test_unknown_extension_is_octet_stream() {
        let att = Attachment::from_bytes("blob.zzzunknown", vec![0u8; 4]);
        assert_eq!(att.content_type().to_string(), "application/octet-stream");
    }

    #[test]
    fn test_inline_content_id() {
        let att = Attachment::inline("logo", "logo.png", vec![1, 2, 3]);
        assert!(att.is_inline());
        assert_eq!(att.content_id(), Some("logo"));
        assert_eq!(att.content_type().to_string(), "image/png");

        let defaulted = Attachment::from_bytes("pic.gif", vec![0]).with_disposition(Disposition::Inline);
        assert_eq!(defaulted.content_id(), Some("pic.gif"));
    }

    #[test]
    fn test_from_file_reads_and_names() {
        let path = std::env::temp_dir().join(format!("mailforge-att-{}.txt", std::process::id()));
        std::fs::write(&path, b"hello").unwrap();

        let att = Attachment::from_file(&path);
        assert_eq!(att.name(), path.file_name().unwrap().to_str().unwrap());
        assert_eq!(att.content_type().to_string(), "text/plain");
        assert_eq!(att.read().unwrap().as_ref(), b"hello");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_unreadable() {
        let att = Attachment::from_file("/nonexistent/mailforge/missing.bin").with_name("missing");
        match att.read() {
            Err(BodyError::AttachmentUnreadable { name, path, .. }) => {
                assert_eq!(name, "missing");
                assert_eq!(path, PathBuf::from("/nonexistent/mailforge/missing.bin"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
