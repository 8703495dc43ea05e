//! Node identifiers.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Largest salt mixed into a derived identifier.
const MAX_SALT: u32 = 99_999_999;

/// Opaque identifier a node announces during the handshake.
///
/// Any non-empty string is accepted from the wire. Locally generated
/// identifiers are 128 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a fresh identifier from the listening address and a random salt.
    pub fn derive(host: &str, port: u16) -> Self {
        let salt = rand::thread_rng().gen_range(1..=MAX_SALT);
        Self::derive_with_salt(host, port, salt)
    }

    /// Deterministic form of [`NodeId::derive`].
    pub fn derive_with_salt(host: &str, port: u16, salt: u32) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(format!("{}{}{}", host, port, salt).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.chars().count() > 16 {
            let prefix: String = self.0.chars().take(16).collect();
            write!(f, "{}…", prefix)
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
