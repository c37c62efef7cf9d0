//! Mailer configuration.
//!
//! Loaded from JSON. Every field except the transport has a default, so a
//! minimal configuration only names how mail leaves the host:
//!
//! ```json
//! { "transport": { "type": "local" } }
//! ```

use crate::error::ConfigError;
use mailforge_mime::Priority;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host name used when the system one cannot be determined.
pub const FALLBACK_HOSTNAME: &str = "localhost.localdomain";

/// Security/encryption mode for SMTP connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption.
    #[default]
    None,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
    /// Implicit TLS (connect directly with TLS).
    Tls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::StartTls => "STARTTLS",
            Self::Tls => "SSL/TLS",
        }
    }
}

/// SMTP server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Server hostname.
    pub host: String,
    /// Server port; defaults from the security mode.
    #[serde(default)]
    pub port: Option<u16>,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
    /// Username; authentication is skipped when absent.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Seconds to wait for each server reply.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seconds to wait for the TCP connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl SmtpSettings {
    /// Creates settings for `host` with default port and timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: None,
            security,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }

    /// Port to connect to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(Self::default_port(self.security))
    }

    /// Username and password, when a non-empty username is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .filter(|user| !user.is_empty())
            .map(|user| (user, self.password.as_deref().unwrap_or_default()))
    }

    /// Per-reply timeout.
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// How messages leave the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Pipe to a sendmail-compatible program.
    Local {
        /// Path to the program.
        #[serde(default = "default_sendmail_path")]
        sendmail_path: PathBuf,
    },
    /// Talk SMTP to a relay.
    Smtp(SmtpSettings),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Local {
            sendmail_path: default_sendmail_path(),
        }
    }
}

/// An address in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressConfig {
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Mailer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Name used in EHLO and in generated Message-IDs.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Default From address.
    #[serde(default)]
    pub from: Option<AddressConfig>,
    /// Default Reply-To address.
    #[serde(default)]
    pub reply_to: Option<AddressConfig>,
    /// Charset for text parts and encoded headers.
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Transfer encoding for text parts (`7bit`, `8bit`, `binary`,
    /// `base64`, `quoted-printable`).
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Word wrap width; 0 disables wrapping.
    #[serde(default)]
    pub word_wrap: usize,
    /// Default priority.
    #[serde(default)]
    pub priority: Priority,
    /// Delivery transport.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            from: None,
            reply_to: None,
            charset: default_charset(),
            encoding: default_encoding(),
            word_wrap: 0,
            priority: Priority::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl MailerConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// The system host name, or [`FALLBACK_HOSTNAME`].
#[must_use]
pub fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
}

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_encoding() -> String {
    "8bit".to_string()
}

fn default_sendmail_path() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

const fn default_timeout_secs() -> u64 {
    8
}

const fn default_connect_timeout_secs() -> u64 {
    30
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
    fn test_minimal_config_defaults() {
        let config = MailerConfig::from_json(r#"{"transport": {"type": "local"}}"#).unwrap();
        assert_eq!(config.charset, "utf-8");
        assert_eq!(config.encoding, "8bit");
        assert_eq!(config.word_wrap, 0);
        assert_eq!(config.priority, Priority::Normal);
        assert!(!config.hostname.is_empty());
        assert!(matches!(
            config.transport,
            TransportConfig::Local { sendmail_path } if sendmail_path == Path::new("/usr/sbin/sendmail")
        ));
    }

    #[test]
    fn test_smtp_config() {
        let config = MailerConfig::from_json(
            r#"{
                "hostname": "app.example.com",
                "from": {"email": "noreply@example.com", "name": "Example"},
                "priority": "high",
                "transport": {
                    "type": "smtp",
                    "host": "smtp.example.com",
                    "security": "starttls",
                    "username": "user",
                    "password": "secret"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.hostname, "app.example.com");
        assert_eq!(config.from.unwrap().name, "Example");
        assert_eq!(config.priority, Priority::High);

        let TransportConfig::Smtp(smtp) = config.transport else {
            panic!("expected smtp transport");
        };
        assert_eq!(smtp.security, Security::StartTls);
        assert_eq!(smtp.port(), 587);
        assert_eq!(smtp.credentials(), Some(("user", "secret")));
        assert_eq!(smtp.reply_timeout(), Duration::from_secs(8));
        assert_eq!(smtp.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(SmtpSettings::default_port(Security::None), 25);
        assert_eq!(SmtpSettings::default_port(Security::StartTls), 587);
        assert_eq!(SmtpSettings::default_port(Security::Tls), 465);

        let mut settings = SmtpSettings::new("mx.example.com", Security::Tls);
        assert_eq!(settings.port(), 465);
        settings.port = Some(2465);
        assert_eq!(settings.port(), 2465);
    }

    #[test]
    fn test_empty_username_skips_auth() {
        let mut settings = SmtpSettings::new("mx.example.com", Security::None);
        assert_eq!(settings.credentials(), None);
        settings.username = Some(String::new());
        assert_eq!(settings.credentials(), None);
        settings.username = Some("user".into());
        assert_eq!(settings.credentials(), Some(("user", "")));
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            MailerConfig::from_json(r#"{"transport": {"type": "pigeon"}}"#),
            Err(ConfigError::Serde(_))
        ));
        assert!(matches!(
            MailerConfig::from_file("/nonexistent/mailforge.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_security_serde() {
        assert_eq!(serde_json::to_string(&Security::StartTls).unwrap(), r#""starttls""#);
        assert_eq!(Security::Tls.display_name(), "SSL/TLS");
    }
}
