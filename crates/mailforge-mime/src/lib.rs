//! # mailforge-mime
//!
//! MIME message generation for outgoing email.
//!
//! ## Features
//!
//! - **Addresses**: Validation with punycode domains, role-keyed sets
//! - **Headers**: RFC 2047 encoded words with Q/B selection, injection stripping
//! - **Bodies**: Eight multipart layouts, transfer-encoding downgrade
//! - **Encoding**: Base64, Quoted-Printable, word wrapping
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailforge_mime::{Address, AddressSet, Boundaries, MessageSpec, Role, body};
//!
//! let mut addresses = AddressSet::new();
//! addresses.add(Address::validate(Role::From, "sender@example.com", "Sender")?)?;
//! addresses.add(Address::new(Role::To, "recipient@bücher.example")?)?;
//!
//! let spec = MessageSpec {
//!     subject: "Hello".into(),
//!     charset: "utf-8".into(),
//!     body: "Hello, World!".into(),
//!     addresses,
//!     ..MessageSpec::default()
//! };
//!
//! let mime = body::build(&spec, &Boundaries::generate())?;
//! print!("{}", mime.header_lines());
//! ```
//!
//! ### Header Encoding
//!
//! ```ignore
//! use mailforge_mime::header::encode_header_text;
//!
//! assert_eq!(encode_header_text("Plain subject", "utf-8"), "Plain subject");
//! assert_eq!(encode_header_text("Café", "utf-8"), "=?utf-8?Q?Caf=C3=A9?=");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod address_set;
mod attachment;
mod content_type;
mod error;
mod id;
mod message;

pub mod body;
pub mod encoding;
pub mod header;

pub use address::{Address, Role};
pub use address_set::{AddressSet, format_entry};
pub use attachment::{Attachment, AttachmentSource, Disposition};
pub use body::{MimeBody, MimeStructure};
pub use content_type::ContentType;
pub use error::{AddressError, BodyError, Result};
pub use header::Headers;
pub use id::{Boundaries, unique_id};
pub use message::{MessageSpec, Priority, TransferEncoding};
