//! Email address validation.

use crate::error::AddressError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Maximum length of the local part (RFC 5321 section 4.5.3.1.1).
const MAX_LOCAL_PART: usize = 64;
/// Maximum length of the domain (RFC 5321 section 4.5.3.1.2).
const MAX_DOMAIN: usize = 253;
/// Maximum length of a domain label.
const MAX_LABEL: usize = 63;
/// Maximum length of a whole address.
const MAX_ADDRESS: usize = 254;

/// The header role an address plays in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// Envelope sender (`MAIL FROM` / `-f`), not rendered as a header.
    Sender,
    /// `From`
    From,
    /// `To`
    To,
    /// `Cc`
    Cc,
    /// `Bcc`
    Bcc,
    /// `Reply-To`
    ReplyTo,
    /// `Disposition-Notification-To`
    ConfirmReadingTo,
}

impl Role {
    /// Header name for this role.
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::Sender => "Sender",
            Self::From => "From",
            Self::To => "To",
            Self::Cc => "Cc",
            Self::Bcc => "Bcc",
            Self::ReplyTo => "Reply-To",
            Self::ConfirmReadingTo => "Disposition-Notification-To",
        }
    }

    /// Roles that hold a single address; a later add replaces the earlier one.
    #[must_use]
    pub const fn is_single_valued(self) -> bool {
        matches!(self, Self::Sender | Self::From | Self::ConfirmReadingTo)
    }

    /// Roles that receive a copy of the message.
    #[must_use]
    pub const fn is_recipient(self) -> bool {
        matches!(self, Self::To | Self::Cc | Self::Bcc)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

/// A validated email address tagged with its role.
///
/// Construction goes through [`Address::validate`], so every value holds a
/// syntactically valid `local@domain`. Equality and hashing use the identity
/// key only, ignoring role and display name.
#[derive(Debug, Clone)]
pub struct Address {
    role: Role,
    local_part: String,
    domain: String,
    display_name: String,
}

impl Address {
    /// Validates and normalises an address.
    ///
    /// The email is trimmed and lowercased, the domain is punycode-encoded if
    /// it contains non-ASCII characters, and CR/LF are stripped from the name.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::MalformedAddress`] when the input is empty or
    /// does not contain exactly one `@`, and [`AddressError::InvalidSyntax`]
    /// when the parts fail the syntax check.
    pub fn validate(role: Role, raw_email: &str, raw_name: &str) -> Result<Self, AddressError> {
        if raw_email.contains(['\r', '\n']) {
            return Err(AddressError::InvalidSyntax(raw_email.escape_debug().to_string()));
        }

        let email = raw_email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AddressError::MalformedAddress("empty address".into()));
        }

        let (local_part, domain) = match email.rsplit_once('@') {
            Some((local, domain)) if !local.contains('@') => (local, domain),
            _ => return Err(AddressError::MalformedAddress(email)),
        };

        let domain = if domain.is_ascii() {
            domain.to_string()
        } else {
            idna::domain_to_ascii(domain).map_err(|_| AddressError::InvalidSyntax(email.clone()))?
        };

        if !is_valid_local_part(local_part)
            || !is_valid_domain(&domain)
            || local_part.len() + 1 + domain.len() > MAX_ADDRESS
        {
            return Err(AddressError::InvalidSyntax(email));
        }

        let display_name = raw_name
            .chars()
            .filter(|&c| c != '\r' && c != '\n')
            .collect::<String>()
            .trim()
            .to_string();

        Ok(Self {
            role,
            local_part: local_part.to_string(),
            domain,
            display_name,
        })
    }

    /// Validates an address without a display name.
    ///
    /// # Errors
    ///
    /// See [`Address::validate`].
    pub fn new(role: Role, email: &str) -> Result<Self, AddressError> {
        Self::validate(role, email, "")
    }

    /// Returns a copy of this address with a different role.
    #[must_use]
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }

    /// The role of this address.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The lowercased local part.
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// The ASCII (punycode) domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The domain decoded back to Unicode for display.
    #[must_use]
    pub fn domain_unicode(&self) -> String {
        idna::domain_to_unicode(&self.domain).0
    }

    /// The display name; empty when none was given.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The wire form `local@domain`, which is also the identity key.
    #[must_use]
    pub fn email(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }

    /// Returns true if the address is made only of alphanumerics and `@_-.`,
    /// which makes it safe to pass as a command-line argument.
    #[must_use]
    pub fn is_shell_safe(&self) -> bool {
        let email = self.email();
        !email.starts_with('-')
            && email
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'@' | b'_' | b'-' | b'.'))
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.local_part == other.local_part && self.domain == other.domain
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local_part.hash(state);
        self.domain.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}@{}", self.local_part, self.domain)
        } else {
            write!(f, "{} <{}@{}>", self.display_name, self.local_part, self.domain)
        }
    }
}

/// RFC 5322 `atext`.
pub(crate) const fn is_atext(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'/' | b'='
                | b'?' | b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~'
        )
}

fn is_valid_local_part(local: &str) -> bool {
    if local.is_empty() || local.len() > MAX_LOCAL_PART {
        return false;
    }

    if let Some(inner) = local.strip_prefix('"').and_then(|l| l.strip_suffix('"')) {
        return is_valid_quoted_string(inner);
    }

    local
        .split('.')
        .all(|atom| !atom.is_empty() && atom.bytes().all(is_atext))
}

fn is_valid_quoted_string(inner: &str) -> bool {
    let mut escaped = false;
    for byte in inner.bytes() {
        if !(0x20..=0x7E).contains(&byte) {
            return false;
        }
        if escaped {
            escaped = false;
        } else if byte == b'\\' {
            escaped = true;
        } else if byte == b'"' {
            return false;
        }
    }
    !escaped
}

fn is_valid_domain(domain: &str) -> bool {
    if let Some(literal) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        return match literal.strip_prefix("ipv6:") {
            Some(v6) => v6.parse::<Ipv6Addr>().is_ok(),
            None => literal.parse::<Ipv4Addr>().is_ok(),
        };
    }

    if domain.is_empty() || domain.len() > MAX_DOMAIN {
        return false;
    }

    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
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
    use proptest::prelude::*;

    #[test]
    fn test_valid_address_normalised() {
        let addr = Address::validate(Role::To, "  John.Doe@Example.COM ", "John Doe").unwrap();
        assert_eq!(addr.local_part(), "john.doe");
        assert_eq!(addr.domain(), "example.com");
        assert_eq!(addr.display_name(), "John Doe");
        assert_eq!(addr.email(), "john.doe@example.com");
        assert_eq!(addr.role(), Role::To);
    }

    #[test]
    fn test_punycode_domain() {
        let addr = Address::new(Role::To, "user@bücher.example").unwrap();
        assert_eq!(addr.domain(), "xn--bcher-kva.example");
        assert_eq!(addr.domain_unicode(), "bücher.example");
    }

    #[test]
    fn test_malformed_addresses() {
        assert!(matches!(
            Address::new(Role::To, "   "),
            Err(AddressError::MalformedAddress(_))
        ));
        assert!(matches!(
            Address::new(Role::To, "userexample.com"),
            Err(AddressError::MalformedAddress(_))
        ));
        assert!(matches!(
            Address::new(Role::To, "a@b@example.com"),
            Err(AddressError::MalformedAddress(_))
        ));
    }

    #[test]
    fn test_invalid_syntax() {
        for bad in [
            "@example.com",
            "user@",
            "us er@example.com",
            ".user@example.com",
            "user..name@example.com",
            "user@-example.com",
            "user@exa_mple.com",
            "user@example..com",
            "us\rer@example.com",
        ] {
            assert!(
                matches!(Address::new(Role::To, bad), Err(AddressError::InvalidSyntax(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_permissive_forms_accepted() {
        for good in [
            "user+tag@example.com",
            "o'brien@example.co.uk",
            "\"john doe\"@example.com",
            "root@localhost",
            "user@[192.168.0.1]",
            "user@[IPv6:2001:db8::1]",
        ] {
            assert!(Address::new(Role::To, good).is_ok(), "{good:?} should be accepted");
        }
    }

    #[test]
    fn test_display_name_stripped() {
        let addr = Address::validate(Role::From, "a@example.com", " Evil\r\nBcc: x@y.z ").unwrap();
        assert_eq!(addr.display_name(), "EvilBcc: x@y.z");
    }

    #[test]
    fn test_identity_ignores_role_and_name() {
        let a = Address::validate(Role::To, "A@example.com", "A").unwrap();
        let b = Address::validate(Role::Cc, "a@EXAMPLE.com", "Other").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shell_safe() {
        assert!(Address::new(Role::Sender, "bounce-1_x@mail.example.com").unwrap().is_shell_safe());
        assert!(!Address::new(Role::Sender, "a+b@example.com").unwrap().is_shell_safe());
        assert!(!Address::new(Role::Sender, "\"a;b\"@example.com").unwrap().is_shell_safe());
    }

    #[test]
    fn test_role_header_names() {
        assert_eq!(Role::ReplyTo.header_name(), "Reply-To");
        assert_eq!(Role::ConfirmReadingTo.to_string(), "Disposition-Notification-To");
        assert!(Role::From.is_single_valued());
        assert!(!Role::To.is_single_valued());
        assert!(Role::Bcc.is_recipient());
    }

    proptest! {
        #[test]
        fn prop_domain_round_trip(
            local in "[a-z0-9]{1,12}",
            label in "[a-zäöüéß]{1,12}",
            tld in "[a-z]{2,6}",
        ) {
            let domain = format!("{label}.{tld}");
            let addr = Address::new(Role::To, &format!("{local}@{domain}")).unwrap();
            prop_assert!(addr.domain().is_ascii());
            let expected = idna::domain_to_unicode(&idna::domain_to_ascii(&domain).unwrap()).0;
            prop_assert_eq!(addr.domain_unicode(), expected);
        }

        #[test]
        fn prop_embedded_break_rejected(
            before in "[a-z]{1,8}",
            after in "[a-z]{1,8}",
            brk in prop::sample::select(vec!["\r", "\n", "\r\n"]),
        ) {
            let raw = format!("{before}{brk}{after}@example.com");
            prop_assert!(Address::new(Role::To, &raw).is_err());
        }
    }
}
