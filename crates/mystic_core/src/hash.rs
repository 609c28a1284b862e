//! Digests used to derive deterministic cache keys.

use sha2::{Digest as _, Sha256};
use std::fmt;

/// A SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Digest of raw bytes
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Digest over several parts joined by `:`
    #[must_use]
    pub fn compute_parts(parts: &[&str]) -> Self {
        Self::compute(parts.join(":").as_bytes())
    }

    /// Lowercase hex form, used as the cache key and disk file stem
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
