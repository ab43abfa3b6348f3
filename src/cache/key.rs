//! Cache key derivation

use sha2::{Digest, Sha256};
use std::fmt;

/// Fixed-length digest naming a cache entry
///
/// The key is a pure function of the request identity and its optional salt,
/// so it is the same on every machine and across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for an identity (absolute URL) and an optional salt
    ///
    /// The salt tells apart requests that share a URL but differ by method or
    /// payload; it is joined to the identity as `identity:salt`.
    pub fn derive(identity: &str, salt: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        if let Some(salt) = salt {
            hasher.update(b":");
            hasher.update(salt.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex digest, which is also the entry's file name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
