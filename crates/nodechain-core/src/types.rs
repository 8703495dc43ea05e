//! Strong type definitions for nodechain.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a SHA-512 digest rendered as hex.
pub const HASH_HEX_LEN: usize = 128;

/// A block hash: the lowercase hex SHA-512 digest of a block's canonical
/// preimage, or the genesis sentinel.
///
/// The first block of a chain links to [`BlockHash::sentinel`] instead of a
/// real digest.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    /// Sentinel value used as `previous_hash` of the first block.
    pub const SENTINEL: &'static str = "0";

    /// The genesis sentinel.
    pub fn sentinel() -> Self {
        Self(Self::SENTINEL.to_string())
    }

    /// Wrap a hex string without checking it.
    pub fn from_hex_unchecked(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Create from raw digest bytes.
    pub fn from_digest(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Whether this is the genesis sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.0 == Self::SENTINEL
    }

    /// Whether this looks like a full-length lowercase hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == HASH_HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Count of leading `'0'` hex digits.
    pub fn leading_zeros(&self) -> usize {
        self.0.bytes().take_while(|&b| b == b'0').count()
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first 16 characters, for logs. Wire data may not be ASCII.
    fn short(&self) -> &str {
        match self.0.char_indices().nth(16) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// Consume into the hex string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.chars().count() > 16 {
            write!(f, "BlockHash({}..)", self.short())
        } else {
            write!(f, "BlockHash({})", self.0)
        }
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

impl AsRef<str> for BlockHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for BlockHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        let s = BlockHash::sentinel();
        assert!(s.is_sentinel());
        assert!(!s.is_well_formed());
        assert_eq!(s.as_str(), "0");
    }

    #[test]
    fn test_from_digest_is_well_formed() {
        let h = BlockHash::from_digest(&[0xab; 64]);
        assert!(h.is_well_formed());
        assert_eq!(h.as_str().len(), HASH_HEX_LEN);
        assert!(!h.is_sentinel());
    }

    #[test]
    fn test_leading_zeros() {
        let mut bytes = [0xffu8; 64];
        bytes[0] = 0x00;
        bytes[1] = 0x0f;
        let h = BlockHash::from_digest(&bytes);
        assert_eq!(h.leading_zeros(), 3);
    }

    #[test]
    fn test_uppercase_not_well_formed() {
        let h = BlockHash::from_hex_unchecked("AB".repeat(64));
        assert!(!h.is_well_formed());
    }

    #[test]
    fn test_display_truncates() {
        let h = BlockHash::from_digest(&[0xcd; 64]);
        assert_eq!(format!("{}", h), "cdcdcdcdcdcdcdcd");
        assert!(format!("{:?}", h).starts_with("BlockHash("));
    }

    #[test]
    fn test_display_truncates_on_char_boundary() {
        let h = BlockHash::from(format!("a{}", "é".repeat(20)));
        assert_eq!(format!("{}", h), format!("a{}", "é".repeat(15)));
        assert!(format!("{:?}", h).ends_with("..)"));

        let short = BlockHash::from("é".repeat(3));
        assert_eq!(format!("{}", short), "ééé");
    }
}
