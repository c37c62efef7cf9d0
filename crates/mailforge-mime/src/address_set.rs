//! Role-keyed collection of validated addresses.

use crate::address::{Address, Role};
use crate::encoding::CRLF;
use crate::header::encode_phrase;
use crate::error::AddressError;
use std::collections::{BTreeMap, HashSet};

/// Addresses grouped by role, in insertion order.
///
/// Multi-valued roles reject a second copy of the same identity key;
/// single-valued roles replace the stored address.
#[derive(Debug, Clone, Default)]
pub struct AddressSet {
    entries: BTreeMap<Role, Vec<Address>>,
}

impl AddressSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an address under its own role.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::DuplicateAddress`] if a multi-valued role
    /// already holds the same identity key.
    pub fn add(&mut self, address: Address) -> Result<(), AddressError> {
        let role = address.role();
        let list = self.entries.entry(role).or_default();

        if role.is_single_valued() {
            list.clear();
        } else if list.contains(&address) {
            return Err(AddressError::DuplicateAddress {
                role: role.header_name(),
                address: address.email(),
            });
        }

        list.push(address);
        Ok(())
    }

    /// Addresses stored for a role.
    #[must_use]
    pub fn get(&self, role: Role) -> &[Address] {
        self.entries.get(&role).map_or(&[], Vec::as_slice)
    }

    /// First address stored for a role.
    #[must_use]
    pub fn first(&self, role: Role) -> Option<&Address> {
        self.get(role).first()
    }

    /// Returns true if the role holds no address.
    #[must_use]
    pub fn is_empty(&self, role: Role) -> bool {
        self.get(role).is_empty()
    }

    /// Envelope recipients: To, Cc, then Bcc, each identity key once.
    #[must_use]
    pub fn recipients(&self) -> Vec<&Address> {
        let mut seen = HashSet::new();
        [Role::To, Role::Cc, Role::Bcc]
            .into_iter()
            .flat_map(|role| self.get(role))
            .filter(|addr| seen.insert(addr.email()))
            .collect()
    }

    /// Renders the header line for a role, CRLF-terminated.
    ///
    /// Returns an empty string when the role has no address. Entries are
    /// separated by `", "` and a fold is inserted before an entry that would
    /// push the current line past `line_width`.
    #[must_use]
    pub fn render(&self, role: Role, line_width: usize, charset: &str) -> String {
        let list = self.get(role);
        if list.is_empty() {
            return String::new();
        }
        render_line(role.header_name(), list, line_width, charset)
    }

    /// Renders a header line for `name` from an arbitrary address list.
    ///
    /// Used when one role falls back to another (e.g. `Reply-To` to `From`).
    #[must_use]
    pub fn render_as(name: &str, list: &[Address], line_width: usize, charset: &str) -> String {
        if list.is_empty() {
            return String::new();
        }
        render_line(name, list, line_width, charset)
    }
}

/// Formats one entry as `Phrase <email>`, or the bare email without a name.
#[must_use]
pub fn format_entry(address: &Address, charset: &str) -> String {
    if address.display_name().is_empty() {
        address.email()
    } else {
        format!(
            "{} <{}>",
            encode_phrase(address.display_name(), charset),
            address.email()
        )
    }
}

fn render_line(name: &str, list: &[Address], line_width: usize, charset: &str) -> String {
    let mut line = format!("{name}: ");
    // Width of the current physical line; encoded phrases may themselves
    // contain folds, so only the text after the last one counts.
    let mut current = line.len();

    for (i, address) in list.iter().enumerate() {
        let entry = format_entry(address, charset);
        let first_segment = entry.split(CRLF).next().map_or(0, str::len);

        if i > 0 {
            line.push(',');
            current += 1;
            if line_width > 0 && current + 1 + first_segment > line_width {
                line.push_str(CRLF);
                current = 0;
            }
            line.push(' ');
            current += 1;
        }

        line.push_str(&entry);
        current = match entry.rfind(CRLF) {
            Some(pos) => entry.len() - pos - CRLF.len(),
            None => current + entry.len(),
        };
    }

    line.push_str(CRLF);
    line
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

    fn addr(role: Role, email: &str, name: &str) -> Address {
        Address::validate(role, email, name).unwrap()
    }

    #[test]
    fn test_duplicate_rejected_per_role() {
        let mut set = AddressSet::new();
        set.add(addr(Role::To, "a@example.com", "")).unwrap();
        let err = set.add(addr(Role::To, "A@Example.com", "Other")).unwrap_err();
        assert_eq!(
            err,
            AddressError::DuplicateAddress {
                role: "To",
                address: "a@example.com".into()
            }
        );

        // Same key under another role is fine.
        set.add(addr(Role::Cc, "a@example.com", "")).unwrap();
        assert_eq!(set.get(Role::Cc).len(), 1);
    }

    #[test]
    fn test_reply_to_duplicates_rejected() {
        let mut set = AddressSet::new();
        set.add(addr(Role::ReplyTo, "r@example.com", "")).unwrap();
        assert!(set.add(addr(Role::ReplyTo, "r@example.com", "")).is_err());
    }

    #[test]
    fn test_single_valued_replaced() {
        let mut set = AddressSet::new();
        set.add(addr(Role::From, "one@example.com", "")).unwrap();
        set.add(addr(Role::From, "two@example.com", "")).unwrap();
        assert_eq!(set.get(Role::From).len(), 1);
        assert_eq!(set.first(Role::From).unwrap().email(), "two@example.com");
    }

    #[test]
    fn test_recipients_deduplicated() {
        let mut set = AddressSet::new();
        set.add(addr(Role::To, "a@example.com", "")).unwrap();
        set.add(addr(Role::Cc, "b@example.com", "")).unwrap();
        set.add(addr(Role::Bcc, "a@example.com", "")).unwrap();
        set.add(addr(Role::Bcc, "c@example.com", "")).unwrap();

        let emails: Vec<_> = set.recipients().iter().map(|a| a.email()).collect();
        assert_eq!(emails, ["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[test]
    fn test_render_empty_role() {
        let set = AddressSet::new();
        assert_eq!(set.render(Role::Cc, 78, "utf-8"), "");
    }

    #[test]
    fn test_render_entries() {
        let mut set = AddressSet::new();
        set.add(addr(Role::To, "a@example.com", "Alice Smith")).unwrap();
        set.add(addr(Role::To, "b@example.com", "")).unwrap();
        assert_eq!(
            set.render(Role::To, 78, "utf-8"),
            "To: Alice Smith <a@example.com>, b@example.com\r\n"
        );
    }

    #[test]
    fn test_render_encodes_names() {
        let mut set = AddressSet::new();
        set.add(addr(Role::From, "j@example.com", "José Martin")).unwrap();
        assert_eq!(
            set.render(Role::From, 78, "utf-8"),
            "From: =?utf-8?Q?Jos=C3=A9_Martin?= <j@example.com>\r\n"
        );
    }

    #[test]
    fn test_render_folds_long_lists() {
        let mut set = AddressSet::new();
        for i in 0..6 {
            set.add(addr(Role::Cc, &format!("recipient{i}@example.com"), ""))
                .unwrap();
        }
        let rendered = set.render(Role::Cc, 78, "utf-8");
        assert!(rendered.starts_with("Cc: recipient0@example.com, "));
        assert!(rendered.ends_with("\r\n"));
        for line in rendered.trim_end().split("\r\n") {
            assert!(line.len() <= 78, "line too long: {line:?}");
        }
        assert!(rendered.contains(",\r\n recipient"));
    }

    #[test]
    fn test_render_as_fallback_name() {
        let mut set = AddressSet::new();
        set.add(addr(Role::From, "f@example.com", "")).unwrap();
        assert_eq!(
            AddressSet::render_as("Reply-To", set.get(Role::From), 78, "utf-8"),
            "Reply-To: f@example.com\r\n"
        );
    }
}
