//! # mailforge
//!
//! Email construction and delivery.
//!
//! This crate provides:
//! - [`MessageBuilder`]: accumulates addresses, bodies, attachments and
//!   headers, then renders and sends the message exactly once
//! - [`Transport`]: delivery through a local sendmail program
//!   ([`LocalMailTransport`]) or an SMTP relay ([`SmtpTransport`])
//! - [`MailerConfig`]: JSON configuration for defaults and transport
//!
//! MIME generation lives in [`mailforge_mime`], the SMTP dialog in
//! [`mailforge_smtp`]; both are re-exported.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailforge::{MailTransport, MailerConfig, MessageBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MailerConfig::from_json(r#"{
//!         "from": {"email": "app@example.com", "name": "My App"},
//!         "transport": {"type": "smtp", "host": "smtp.example.com", "security": "starttls",
//!                       "username": "app@example.com", "password": "secret"}
//!     }"#)?;
//!     let mut transport = MailTransport::from_config(&config);
//!
//!     let mut message = MessageBuilder::from_config(&config)?;
//!     message
//!         .add_to("user@example.com", "User")?
//!         .subject("Your report")
//!         .body("See attached.")
//!         .attach_file("report.pdf")?;
//!     message.send(&mut transport).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
mod message;
pub mod transport;

pub use config::{AddressConfig, MailerConfig, Security, SmtpSettings, TransportConfig};
pub use error::{ConfigError, MailerError, Result, TransportError};
pub use message::{HEADER_LINE_WIDTH, MessageBuilder, SendState};
pub use transport::{Envelope, LocalMailTransport, MailTransport, SmtpTransport, Transport};

pub use mailforge_mime;
pub use mailforge_smtp;
pub use mailforge_mime::{Attachment, Disposition, Priority, TransferEncoding};
