//! Message builder with single-send semantics.

use crate::config::{MailerConfig, default_hostname};
use crate::error::{MailerError, Result};
use crate::transport::{Envelope, Transport, assemble};
use mailforge_mime::header::{encode_header_text, secure_header};
use mailforge_mime::{
    Address, AddressError, AddressSet, Attachment, BodyError, Boundaries, MessageSpec, Priority,
    Role, TransferEncoding, body,
};
use std::fmt::Write;
use std::path::PathBuf;

type AddressResult<T> = std::result::Result<T, AddressError>;
type BodyResult<T> = std::result::Result<T, BodyError>;

/// Width at which address headers are folded.
pub const HEADER_LINE_WIDTH: usize = 78;

/// Lifecycle of a [`MessageBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    /// Not yet delivered; may be sent.
    #[default]
    Draft,
    /// Delivered; any further send returns [`MailerError::AlreadySent`].
    Sent,
    /// Delivery failed permanently; any further send returns
    /// [`MailerError::Failed`].
    Failed,
}

/// Which optional headers the transport wants in the header block.
#[derive(Debug, Clone, Copy)]
struct HeaderPolicy {
    recipients: bool,
    subject: bool,
    bcc: bool,
}

impl HeaderPolicy {
    fn of<T: Transport>(transport: &T) -> Self {
        Self {
            recipients: transport.includes_recipient_headers(),
            subject: transport.includes_subject_header(),
            bcc: transport.includes_bcc_header(),
        }
    }

    const PREVIEW: Self = Self {
        recipients: true,
        subject: true,
        bcc: false,
    };
}

/// A rendered message ready for a transport.
#[derive(Debug)]
struct Composed {
    envelope: Envelope,
    message_id: String,
    header: String,
    body: Vec<u8>,
}

/// Accumulates a message and sends it at most once.
///
/// Address and header setters validate eagerly and return errors at the
/// call site. Body encoding happens at [`send`](Self::send) time.
///
/// # Example
///
/// ```ignore
/// use mailforge::{MailTransport, MailerConfig, MessageBuilder};
///
/// let config = MailerConfig::from_file("mailforge.json")?;
/// let mut transport = MailTransport::from_config(&config);
///
/// let mut message = MessageBuilder::from_config(&config)?;
/// message
///     .add_to("user@example.com", "User")?
///     .subject("Welcome")
///     .html_body("<p>Hello!</p>")
///     .alt_body("Hello!");
/// message.send(&mut transport).await?;
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    spec: MessageSpec,
    hostname: String,
    state: SendState,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    /// Creates an empty draft using the system host name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: MessageSpec {
                charset: "utf-8".to_string(),
                ..MessageSpec::default()
            },
            hostname: default_hostname(),
            state: SendState::Draft,
        }
    }

    /// Creates a draft carrying the defaults from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured address is invalid or the configured
    /// encoding is unknown.
    pub fn from_config(config: &MailerConfig) -> Result<Self> {
        let mut builder = Self::new();
        builder
            .hostname(&config.hostname)
            .charset(&config.charset)
            .encoding(config.encoding.parse()?)
            .priority(config.priority)
            .word_wrap(config.word_wrap);

        if let Some(from) = &config.from {
            builder.from(&from.email, &from.name)?;
        }
        if let Some(reply_to) = &config.reply_to {
            builder.add_reply_to(&reply_to.email, &reply_to.name)?;
        }
        Ok(builder)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SendState {
        self.state
    }

    /// Addresses added so far.
    #[must_use]
    pub const fn addresses(&self) -> &AddressSet {
        &self.spec.addresses
    }

    /// Sets the host name used in generated Message-IDs.
    pub fn hostname(&mut self, hostname: &str) -> &mut Self {
        self.hostname = secure_header(hostname);
        self
    }

    fn add_address(&mut self, role: Role, email: &str, name: &str) -> AddressResult<&mut Self> {
        self.spec.addresses.add(Address::validate(role, email, name)?)?;
        Ok(self)
    }

    /// Sets the From address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn from(&mut self, email: &str, name: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::From, email, name)
    }

    /// Sets the envelope sender (return path). Defaults to the From address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn sender(&mut self, email: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::Sender, email, "")
    }

    /// Adds a To recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or already a To recipient.
    pub fn add_to(&mut self, email: &str, name: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::To, email, name)
    }

    /// Adds a Cc recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or already a Cc recipient.
    pub fn add_cc(&mut self, email: &str, name: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::Cc, email, name)
    }

    /// Adds a Bcc recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or already a Bcc recipient.
    pub fn add_bcc(&mut self, email: &str, name: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::Bcc, email, name)
    }

    /// Adds a Reply-To address. Without one, replies go to From.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or already present.
    pub fn add_reply_to(&mut self, email: &str, name: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::ReplyTo, email, name)
    }

    /// Requests a read receipt (`Disposition-Notification-To`).
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn confirm_reading_to(&mut self, email: &str) -> AddressResult<&mut Self> {
        self.add_address(Role::ConfirmReadingTo, email, "")
    }

    /// Sets the subject.
    pub fn subject(&mut self, subject: &str) -> &mut Self {
        self.spec.subject = subject.to_string();
        self
    }

    /// Sets the charset for text parts and encoded headers.
    pub fn charset(&mut self, charset: &str) -> &mut Self {
        self.spec.charset = secure_header(charset);
        self
    }

    /// Sets the transfer encoding for text parts.
    pub const fn encoding(&mut self, encoding: TransferEncoding) -> &mut Self {
        self.spec.encoding = encoding;
        self
    }

    /// Sets the priority.
    pub const fn priority(&mut self, priority: Priority) -> &mut Self {
        self.spec.priority = priority;
        self
    }

    /// Sets a plain-text primary body.
    pub fn body(&mut self, text: &str) -> &mut Self {
        self.spec.body = text.to_string();
        self.spec.is_html = false;
        self
    }

    /// Sets an HTML primary body.
    pub fn html_body(&mut self, html: &str) -> &mut Self {
        self.spec.body = html.to_string();
        self.spec.is_html = true;
        self
    }

    /// Sets the plain-text alternative shown by clients that skip HTML.
    pub fn alt_body(&mut self, text: &str) -> &mut Self {
        self.spec.alt_body = Some(text.to_string());
        self
    }

    /// Sets the word wrap width; 0 disables wrapping.
    pub const fn word_wrap(&mut self, width: usize) -> &mut Self {
        self.spec.word_wrap = width;
        self
    }

    /// Sets an explicit Message-ID. Without a domain part the host name is
    /// appended.
    pub fn message_id(&mut self, id: &str) -> &mut Self {
        let id = secure_header(id);
        self.spec.message_id = Some(id.trim_start_matches('<').trim_end_matches('>').to_string());
        self
    }

    /// Adds a custom header.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::InvalidHeader`] if the name is empty or holds
    /// anything but printable ASCII without `:`, or if either part contains
    /// a line break.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MailerError::InvalidHeader("empty header name".into()));
        }
        if !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
            return Err(MailerError::InvalidHeader(format!("invalid header name {name:?}")));
        }
        if value.contains(['\r', '\n']) {
            return Err(MailerError::InvalidHeader(format!("line break in value of {name}")));
        }

        self.spec
            .custom_headers
            .push((name.to_string(), value.trim().to_string()));
        Ok(self)
    }

    /// Adds an attachment.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError::DuplicateAttachment`] if an attachment with the
    /// same name was already added.
    pub fn attach(&mut self, attachment: Attachment) -> BodyResult<&mut Self> {
        if self
            .spec
            .attachments
            .iter()
            .any(|existing| existing.name() == attachment.name())
        {
            return Err(BodyError::DuplicateAttachment(attachment.name().to_string()));
        }
        self.spec.attachments.push(attachment);
        Ok(self)
    }

    /// Attaches a file, read when the message is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment with the same name exists.
    pub fn attach_file(&mut self, path: impl Into<PathBuf>) -> BodyResult<&mut Self> {
        self.attach(Attachment::from_file(path))
    }

    /// Attaches in-memory content.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment with the same name exists.
    pub fn attach_bytes(
        &mut self,
        name: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> BodyResult<&mut Self> {
        self.attach(Attachment::from_bytes(name, bytes))
    }

    /// Embeds in-memory content referenced from HTML as `cid:<cid>`.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment with the same name exists.
    pub fn embed_bytes(
        &mut self,
        cid: &str,
        name: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> BodyResult<&mut Self> {
        self.attach(Attachment::inline(cid, name, bytes))
    }

    /// Renders the complete message without sending it.
    ///
    /// The header block is the one an SMTP transport would receive, so the
    /// `Bcc` header is left out.
    ///
    /// # Errors
    ///
    /// Returns the same validation and body errors as [`send`](Self::send).
    pub fn render(&self) -> Result<Vec<u8>> {
        let composed = self.compose(HeaderPolicy::PREVIEW)?;
        Ok(assemble(&composed.header, &composed.body))
    }

    /// Builds and delivers the message.
    ///
    /// On success the builder becomes [`SendState::Sent`]. On a retryable
    /// transport error it stays a draft and may be sent again; on any other
    /// transport error it becomes [`SendState::Failed`].
    ///
    /// # Errors
    ///
    /// - [`MailerError::AlreadySent`] / [`MailerError::Failed`] after an
    ///   earlier send
    /// - [`MailerError::EmptyBody`], [`MailerError::MissingFrom`],
    ///   [`MailerError::NoRecipients`] for incomplete drafts
    /// - [`MailerError::Body`] if an attachment cannot be read
    /// - [`MailerError::Transport`] if delivery fails
    pub async fn send<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        match self.state {
            SendState::Sent => return Err(MailerError::AlreadySent),
            SendState::Failed => return Err(MailerError::Failed),
            SendState::Draft => {}
        }

        let composed = self.compose(HeaderPolicy::of(transport))?;
        let result = transport
            .deliver(&composed.envelope, &composed.header, &composed.body)
            .await;

        match result {
            Ok(()) => {
                self.state = SendState::Sent;
                tracing::info!(
                    message_id = %composed.message_id,
                    recipients = composed.envelope.recipients.len(),
                    "Message delivered"
                );
                Ok(())
            }
            Err(e) => {
                let retryable = e.is_retryable();
                if !retryable {
                    self.state = SendState::Failed;
                }
                tracing::error!(
                    message_id = %composed.message_id,
                    error = %e,
                    retryable,
                    "Message delivery failed"
                );
                Err(e.into())
            }
        }
    }

    fn compose(&self, policy: HeaderPolicy) -> Result<Composed> {
        if self.spec.body.is_empty() {
            return Err(MailerError::EmptyBody);
        }

        let addresses = &self.spec.addresses;
        let from = addresses.first(Role::From).ok_or(MailerError::MissingFrom)?;
        let recipients: Vec<Address> = addresses.recipients().into_iter().cloned().collect();
        if recipients.is_empty() {
            return Err(MailerError::NoRecipients);
        }
        let sender = addresses.first(Role::Sender).unwrap_or(from).clone();

        let spec = self.spec.clone().word_wrapped();
        let boundaries = Boundaries::generate();
        let mime = body::build(&spec, &boundaries)?;

        let message_id = self.message_id_value(&spec, boundaries.id());
        let date = chrono::Local::now().to_rfc2822();

        let mut header = header_block(&spec, policy, &date, &message_id);
        header.push_str(&mime.header_lines());

        Ok(Composed {
            envelope: Envelope::new(Some(sender), recipients),
            message_id,
            header,
            body: mime.body,
        })
    }

    fn message_id_value(&self, spec: &MessageSpec, unique: &str) -> String {
        match spec.message_id.as_deref() {
            Some(id) if id.contains('@') => format!("<{id}>"),
            Some(id) => format!("<{id}@{}>", self.hostname),
            None => format!("<{unique}@{}>", self.hostname),
        }
    }
}

/// Assembles the header block up to and including `MIME-Version`.
fn header_block(spec: &MessageSpec, policy: HeaderPolicy, date: &str, message_id: &str) -> String {
    let addresses = &spec.addresses;
    let charset = spec.charset.as_str();
    let render = |role| addresses.render(role, HEADER_LINE_WIDTH, charset);

    let mut header = String::new();
    let _ = write!(header, "Date: {date}\r\n");
    header.push_str(&render(Role::From));

    if policy.recipients {
        if !addresses.is_empty(Role::To) {
            header.push_str(&render(Role::To));
        } else if addresses.is_empty(Role::Cc) {
            header.push_str("To: undisclosed-recipients:;\r\n");
        }
    }
    header.push_str(&render(Role::Cc));
    if policy.bcc {
        header.push_str(&render(Role::Bcc));
    }

    if addresses.is_empty(Role::ReplyTo) {
        header.push_str(&AddressSet::render_as(
            Role::ReplyTo.header_name(),
            addresses.get(Role::From),
            HEADER_LINE_WIDTH,
            charset,
        ));
    } else {
        header.push_str(&render(Role::ReplyTo));
    }

    if policy.subject {
        let subject = encode_header_text(&secure_header(&spec.subject), charset);
        let _ = write!(header, "Subject: {subject}\r\n");
    }

    let _ = write!(header, "Message-ID: {message_id}\r\n");
    if let Some(priority) = spec.priority.header_value() {
        let _ = write!(header, "X-Priority: {priority}\r\n");
    }
    header.push_str(&render(Role::ConfirmReadingTo));

    for (name, value) in &spec.custom_headers {
        let _ = write!(header, "{name}: {}\r\n", encode_header_text(value, charset));
    }

    header.push_str("MIME-Version: 1.0\r\n");
    header
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
    use crate::error::TransportError;
    use std::time::Duration;

    /// Records deliveries and answers with a scripted outcome.
    #[derive(Default)]
    struct RecordingTransport {
        delivered: Vec<(Envelope, String, Vec<u8>)>,
        outcome: Option<TransportError>,
        bcc: bool,
        subject_hidden: bool,
    }

    impl Transport for RecordingTransport {
        async fn deliver(
            &mut self,
            envelope: &Envelope,
            header: &str,
            body: &[u8],
        ) -> std::result::Result<(), TransportError> {
            self.delivered
                .push((envelope.clone(), header.to_string(), body.to_vec()));
            self.outcome.take().map_or(Ok(()), Err)
        }

        fn includes_subject_header(&self) -> bool {
            !self.subject_hidden
        }

        fn includes_bcc_header(&self) -> bool {
            self.bcc
        }
    }

    fn draft() -> MessageBuilder {
        let mut builder = MessageBuilder::new();
        builder
            .hostname("app.example.com")
            .from("sender@example.com", "Sender")
            .unwrap()
            .add_to("to@example.com", "")
            .unwrap()
            .subject("Hello")
            .body("Body text");
        builder
    }

    fn header_names(header: &str) -> Vec<&str> {
        header
            .split("\r\n")
            .filter(|line| !line.is_empty() && !line.starts_with([' ', '\t']))
            .filter_map(|line| line.split_once(':').map(|(name, _)| name))
            .collect()
    }

    fn header_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
        header
            .split("\r\n")
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
    }

    #[tokio::test]
    async fn test_header_order() {
        let mut builder = draft();
        builder
            .add_cc("cc@example.com", "")
            .unwrap()
            .add_bcc("bcc@example.com", "")
            .unwrap()
            .add_reply_to("replies@example.com", "")
            .unwrap()
            .confirm_reading_to("receipts@example.com")
            .unwrap()
            .priority(Priority::High)
            .add_header("X-Mailer", "mailforge")
            .unwrap();

        let mut transport = RecordingTransport {
            bcc: true,
            ..RecordingTransport::default()
        };
        builder.send(&mut transport).await.unwrap();

        let (_, header, _) = &transport.delivered[0];
        assert_eq!(
            header_names(header),
            [
                "Date",
                "From",
                "To",
                "Cc",
                "Bcc",
                "Reply-To",
                "Subject",
                "Message-ID",
                "X-Priority",
                "Disposition-Notification-To",
                "X-Mailer",
                "MIME-Version",
                "Content-Type",
            ]
        );
        assert_eq!(header_value(header, "X-Priority"), Some("1"));
        assert_eq!(header_value(header, "From"), Some("Sender <sender@example.com>"));
        assert!(header.ends_with("\r\n"));
    }

    #[tokio::test]
    async fn test_bcc_only_uses_undisclosed_recipients() {
        let mut builder = MessageBuilder::new();
        builder
            .from("sender@example.com", "")
            .unwrap()
            .add_bcc("hidden@example.com", "")
            .unwrap()
            .body("x");

        let mut transport = RecordingTransport::default();
        builder.send(&mut transport).await.unwrap();

        let (envelope, header, _) = &transport.delivered[0];
        assert_eq!(header_value(header, "To"), Some("undisclosed-recipients:;"));
        assert!(header_value(header, "Bcc").is_none());
        assert_eq!(envelope.recipients.len(), 1);
        assert_eq!(envelope.recipients[0].email(), "hidden@example.com");
    }

    #[test]
    fn test_cc_only_has_no_to_header() {
        let mut builder = MessageBuilder::new();
        builder
            .from("sender@example.com", "")
            .unwrap()
            .add_cc("cc@example.com", "")
            .unwrap()
            .body("x");

        let rendered = String::from_utf8(builder.render().unwrap()).unwrap();
        assert!(header_value(&rendered, "To").is_none());
        assert_eq!(header_value(&rendered, "Cc"), Some("cc@example.com"));
    }

    #[test]
    fn test_reply_to_falls_back_to_from() {
        let rendered = String::from_utf8(draft().render().unwrap()).unwrap();
        assert!(rendered.contains("Reply-To: Sender <sender@example.com>\r\n"));
    }

    #[test]
    fn test_normal_priority_has_no_header() {
        let rendered = String::from_utf8(draft().render().unwrap()).unwrap();
        assert!(!rendered.contains("X-Priority"));

        let mut low = draft();
        low.priority(Priority::Low);
        let rendered = String::from_utf8(low.render().unwrap()).unwrap();
        assert!(rendered.contains("X-Priority: 5\r\n"));
    }

    #[test]
    fn test_message_id() {
        let rendered = String::from_utf8(draft().render().unwrap()).unwrap();
        let id = header_value(&rendered, "Message-ID").unwrap();
        let inner = id.strip_prefix('<').unwrap().strip_suffix("@app.example.com>").unwrap();
        assert_eq!(inner.len(), 64);
        assert!(inner.bytes().all(|b| b.is_ascii_hexdigit()));

        let mut explicit = draft();
        explicit.message_id("<fixed-id>");
        let rendered = String::from_utf8(explicit.render().unwrap()).unwrap();
        assert_eq!(header_value(&rendered, "Message-ID"), Some("<fixed-id@app.example.com>"));

        explicit.message_id("abc@elsewhere.test");
        let rendered = String::from_utf8(explicit.render().unwrap()).unwrap();
        assert_eq!(header_value(&rendered, "Message-ID"), Some("<abc@elsewhere.test>"));
    }

    #[test]
    fn test_subject_encoded() {
        let mut builder = draft();
        builder.subject("Café\r\nBcc: evil@example.com");
        let rendered = String::from_utf8(builder.render().unwrap()).unwrap();
        let subject = header_value(&rendered, "Subject").unwrap();
        assert!(subject.starts_with("=?utf-8?Q?Caf=C3=A9"), "{subject}");
        assert!(!rendered.contains("\r\nBcc:"));
    }

    #[tokio::test]
    async fn test_subject_omitted_when_transport_declines() {
        let mut transport = RecordingTransport {
            subject_hidden: true,
            ..RecordingTransport::default()
        };
        draft().send(&mut transport).await.unwrap();
        assert!(header_value(&transport.delivered[0].1, "Subject").is_none());
    }

    #[test]
    fn test_invalid_headers_rejected() {
        let mut builder = draft();
        assert!(matches!(
            builder.add_header("", "x"),
            Err(MailerError::InvalidHeader(_))
        ));
        assert!(matches!(
            builder.add_header("Bad Name", "x"),
            Err(MailerError::InvalidHeader(_))
        ));
        assert!(matches!(
            builder.add_header("X-Test", "a\r\nBcc: evil@example.com"),
            Err(MailerError::InvalidHeader(_))
        ));
        assert!(builder.add_header("X-Test", "ok").is_ok());
    }

    #[test]
    fn test_incomplete_drafts() {
        let mut builder = draft();
        builder.body("");
        assert!(matches!(builder.render(), Err(MailerError::EmptyBody)));

        let mut builder = MessageBuilder::new();
        builder.add_to("to@example.com", "").unwrap().body("x");
        assert!(matches!(builder.render(), Err(MailerError::MissingFrom)));

        let mut builder = MessageBuilder::new();
        builder.from("from@example.com", "").unwrap().body("x");
        assert!(matches!(builder.render(), Err(MailerError::NoRecipients)));
    }

    #[test]
    fn test_address_errors_at_call_site() {
        let mut builder = draft();
        assert!(matches!(
            builder.add_to("not-an-address", ""),
            Err(AddressError::MalformedAddress(_))
        ));
        assert!(matches!(
            builder.add_to("TO@example.com", ""),
            Err(AddressError::DuplicateAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_send_is_rejected() {
        let mut builder = draft();
        let mut transport = RecordingTransport::default();

        builder.send(&mut transport).await.unwrap();
        assert_eq!(builder.state(), SendState::Sent);

        assert!(matches!(
            builder.send(&mut transport).await,
            Err(MailerError::AlreadySent)
        ));
        assert_eq!(transport.delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_keeps_draft() {
        let mut builder = draft();
        let mut transport = RecordingTransport {
            outcome: Some(TransportError::Timeout(Duration::from_secs(8))),
            ..RecordingTransport::default()
        };

        let err = builder.send(&mut transport).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(builder.state(), SendState::Draft);

        builder.send(&mut transport).await.unwrap();
        assert_eq!(builder.state(), SendState::Sent);
        assert_eq!(transport.delivered.len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_terminal() {
        let mut builder = draft();
        let mut transport = RecordingTransport {
            outcome: Some(TransportError::UnexpectedResponse {
                code: 550,
                message: "mailbox unavailable".into(),
            }),
            ..RecordingTransport::default()
        };

        let err = builder.send(&mut transport).await.unwrap_err();
        assert!(matches!(
            err,
            MailerError::Transport(TransportError::UnexpectedResponse { code: 550, .. })
        ));
        assert_eq!(builder.state(), SendState::Failed);

        assert!(matches!(
            builder.send(&mut transport).await,
            Err(MailerError::Failed)
        ));
        assert_eq!(transport.delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_envelope() {
        let mut builder = draft();
        builder
            .sender("bounces@example.com")
            .unwrap()
            .add_cc("cc@example.com", "")
            .unwrap()
            .add_bcc("to@example.com", "")
            .unwrap();

        let mut transport = RecordingTransport::default();
        builder.send(&mut transport).await.unwrap();

        let (envelope, header, _) = &transport.delivered[0];
        assert_eq!(envelope.sender_email(), "bounces@example.com");
        let recipients: Vec<_> = envelope.recipients.iter().map(Address::email).collect();
        assert_eq!(recipients, ["to@example.com", "cc@example.com"]);
        assert!(header_value(header, "Sender").is_none());
    }

    #[test]
    fn test_duplicate_attachment() {
        let mut builder = draft();
        builder.attach_bytes("report.pdf", b"%PDF".to_vec()).unwrap();
        assert!(matches!(
            builder.attach_bytes("report.pdf", b"other".to_vec()),
            Err(BodyError::DuplicateAttachment(name)) if name == "report.pdf"
        ));
    }

    #[test]
    fn test_unreadable_attachment_fails_render() {
        let mut builder = draft();
        builder.attach_file("/nonexistent/file.txt").unwrap();
        assert!(matches!(
            builder.render(),
            Err(MailerError::Body(BodyError::AttachmentUnreadable { .. }))
        ));
        assert_eq!(builder.state(), SendState::Draft);
    }

    #[test]
    fn test_html_with_alternative_and_embed() {
        let mut builder = draft();
        builder
            .html_body("<p><img src=\"cid:logo\"></p>")
            .alt_body("plain version")
            .embed_bytes("logo", "logo.png", vec![0x89, b'P', b'N', b'G'])
            .unwrap();

        let rendered = String::from_utf8(builder.render().unwrap()).unwrap();
        let content_type = header_value(&rendered, "Content-Type").unwrap();
        assert!(content_type.starts_with("multipart/related;"), "{content_type}");
        assert!(rendered.contains("multipart/alternative;"));
        assert!(rendered.contains("Content-ID: <logo>"));
        assert!(rendered.contains("plain version"));
    }

    #[test]
    fn test_from_config() {
        let config = MailerConfig::from_json(
            r#"{
                "hostname": "cfg.example.com",
                "from": {"email": "noreply@example.com", "name": "No Reply"},
                "reply_to": {"email": "support@example.com"},
                "encoding": "quoted-printable",
                "priority": "low",
                "transport": {"type": "local"}
            }"#,
        )
        .unwrap();

        let mut builder = MessageBuilder::from_config(&config).unwrap();
        builder.add_to("to@example.com", "").unwrap().body("x");
        let rendered = String::from_utf8(builder.render().unwrap()).unwrap();
        assert!(rendered.contains("From: No Reply <noreply@example.com>\r\n"));
        assert!(rendered.contains("Reply-To: support@example.com\r\n"));
        assert!(rendered.contains("@cfg.example.com>\r\n"));
        assert!(rendered.contains("X-Priority: 5\r\n"));

        let bad = MailerConfig {
            encoding: "uuencode".into(),
            ..config
        };
        assert!(matches!(
            MessageBuilder::from_config(&bad),
            Err(MailerError::Body(BodyError::UnsupportedEncoding(_)))
        ));
    }
}
