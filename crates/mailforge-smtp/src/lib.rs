//! # mailforge-smtp
//!
//! Async SMTP submission client (RFC 5321).
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of the
//!   submission dialog order
//! - **Strict reply gating**: Each step accepts only its expected reply code
//! - **Timeouts**: Bounded connect and per-reply waits
//! - **TLS support**: Both implicit TLS (port 465) and STARTTLS
//! - **Authentication**: LOGIN and PLAIN
//! - **DATA preparation**: Line splitting and dot-stuffing
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailforge_smtp::{Client, DEFAULT_REPLY_TIMEOUT};
//! use mailforge_smtp::connection::{connect, default_tls_config};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> mailforge_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587, Duration::from_secs(30)).await?;
//!     let client = Client::from_stream(stream, DEFAULT_REPLY_TIMEOUT).await?;
//!
//!     let client = client.ehlo("client.example.com").await?;
//!     let client = client.starttls("smtp.example.com", default_tls_config()).await?;
//!     let client = client.auth_login("user@example.com", "password").await?;
//!
//!     let client = client.mail_from("sender@example.com").await?;
//!     let client = client.rcpt_to("recipient@example.com").await?;
//!     let client = client.data().await?;
//!
//!     let message = b"Subject: Test\r\n\r\nHello, World!\r\n";
//!     let client = client.send_message(message).await?;
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth_login() / auth_plain() ───→ Authenticated
//! └──────────────┘
//!        │
//!        └─── mail_from() ───→ MailTransaction ───→ RecipientAdded ───→ Data
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod data;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Client, DEFAULT_REPLY_TIMEOUT, ServerInfo};
pub use error::{Error, Result};
pub use types::{AuthMechanism, Extension, Reply, ReplyCode};
