//! Schema fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};

/// Length of a fingerprint computed by [`Fingerprint::of`].
pub const FINGERPRINT_LEN: usize = 64;

/// SHA-256 hex digest of a schema creation script.
///
/// Equality is byte-exact: no whitespace or case normalization is applied,
/// so two scripts that differ only in formatting produce different
/// fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the UTF-8 bytes of a script.
    pub fn of(script: &str) -> Self {
        let digest = Sha256::digest(script.as_bytes());
        Self(hex::encode(digest))
    }

    /// Wrap a value read back from a store, verbatim.
    ///
    /// Stored values are not validated; anything that does not equal a freshly
    /// computed fingerprint simply counts as a schema change.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the hex digest.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Short prefix for log output.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
