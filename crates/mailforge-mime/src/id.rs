//! Random identifiers for MIME boundaries and Message-IDs.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Returns a 64-hex-digit id: SHA-256 of 32 bytes from the thread RNG.
#[must_use]
pub fn unique_id() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    format!("{:x}", Sha256::digest(seed))
}

/// The three boundary tokens one message may need.
///
/// All three share one id and differ only by their `b{n}=_` prefix, so
/// nested multiparts never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundaries {
    id: String,
}

impl Boundaries {
    /// Generates a fresh set.
    #[must_use]
    pub fn generate() -> Self {
        Self { id: unique_id() }
    }

    /// Builds boundaries from a known id.
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The shared id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Boundary `n` (1-based).
    #[must_use]
    pub fn get(&self, n: u8) -> String {
        format!("b{n}=_{}", self.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_unique_id_shape() {
        let id = unique_id();
        assert_eq!(id.len(), 64);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn test_unique_ids_differ() {
        let ids: HashSet<_> = (0..32).map(|_| unique_id()).collect();
        assert_eq!(ids.len(), 32);
    }

    #[test]
    fn test_boundaries_distinct() {
        let b = Boundaries::from_id("abc");
        assert_eq!(b.get(1), "b1=_abc");
        assert_eq!(b.get(2), "b2=_abc");
        assert_ne!(b.get(1), b.get(3));
    }

    #[test]
    fn test_ids_from_threads() {
        let handles: Vec<_> = (0..4).map(|_| std::thread::spawn(unique_id)).collect();
        let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 4);
    }
}
